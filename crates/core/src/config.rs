//! Session configuration and the policies it's made of.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use chatzoo_model::PersonaId;
use rand::Rng;

use crate::persona::{AnswerMode, persona};

/// The text shown in place of an answer that could not be received.
pub const FALLBACK_TEXT: &str =
    "I'm having trouble thinking right now... try again?";

const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

/// The error returned when a policy can't be parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseConfigError {
    what: &'static str,
    input: String,
}

impl ParseConfigError {
    fn new(what: &'static str, input: &str) -> Self {
        Self {
            what,
            input: input.to_owned(),
        }
    }
}

impl Display for ParseConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.what, self.input)
    }
}

impl std::error::Error for ParseConfigError {}

/// How long a paced reveal waits before each increment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacingPolicy {
    /// Always the same delay.
    Fixed(Duration),
    /// A uniformly random delay in `min..=max`, drawn per increment.
    Jittered { min: Duration, max: Duration },
}

impl PacingPolicy {
    /// Draws the delay before the next increment.
    #[inline]
    pub fn next_delay(&self) -> Duration {
        self.next_delay_with(&mut rand::thread_rng())
    }

    pub fn next_delay_with<R: Rng>(&self, rng: &mut R) -> Duration {
        match *self {
            PacingPolicy::Fixed(delay) => delay,
            PacingPolicy::Jittered { min, max } if max <= min => min,
            PacingPolicy::Jittered { min, max } => rng.gen_range(min..=max),
        }
    }
}

impl Default for PacingPolicy {
    #[inline]
    fn default() -> Self {
        PacingPolicy::Fixed(DEFAULT_INTERVAL)
    }
}

fn parse_millis(s: &str) -> Option<Duration> {
    s.trim().parse().ok().map(Duration::from_millis)
}

impl FromStr for PacingPolicy {
    type Err = ParseConfigError;

    /// Accepts `fixed:<ms>`, `jitter:<min>-<max>` or a bare `<ms>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseConfigError::new("pacing policy", s);
        let (kind, args) = s.trim().split_once(':').unwrap_or(("fixed", s));
        match kind {
            "fixed" => parse_millis(args).map(PacingPolicy::Fixed).ok_or_else(err),
            "jitter" => {
                let (min, max) = args.split_once('-').ok_or_else(err)?;
                let min = parse_millis(min).ok_or_else(err)?;
                let max = parse_millis(max).ok_or_else(err)?;
                if max < min {
                    return Err(err());
                }
                Ok(PacingPolicy::Jittered { min, max })
            }
            _ => Err(err()),
        }
    }
}

/// How many answers may be in flight at once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConcurrencyPolicy {
    /// Submissions are refused while any answer is in flight.
    #[default]
    GlobalSingleFlight,
    /// Every persona may have one answer in flight. A new submission to a
    /// busy persona cancels its current answer.
    PerPersona,
}

impl FromStr for ConcurrencyPolicy {
    type Err = ParseConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "global" | "single-flight" => Ok(ConcurrencyPolicy::GlobalSingleFlight),
            "per-persona" => Ok(ConcurrencyPolicy::PerPersona),
            _ => Err(ParseConfigError::new("concurrency policy", s)),
        }
    }
}

/// What happens to a conversation when the user switches away from it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HistoryPolicy {
    /// Every persona keeps its own log.
    #[default]
    Retain,
    /// The log of the persona being left is dropped.
    WipeOnSwitch,
}

impl FromStr for HistoryPolicy {
    type Err = ParseConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "retain" => Ok(HistoryPolicy::Retain),
            "wipe" | "wipe-on-switch" => Ok(HistoryPolicy::WipeOnSwitch),
            _ => Err(ParseConfigError::new("history policy", s)),
        }
    }
}

/// Retries of rate-limited requests, before any answer is received.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_interval: Duration,
}

impl RetryPolicy {
    /// Never retry.
    pub const NEVER: RetryPolicy = RetryPolicy {
        max_retries: 0,
        initial_interval: Duration::ZERO,
    };
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_interval: Duration::from_millis(500),
        }
    }
}

/// Everything a session can be tuned with. See [`crate::SessionBuilder`].
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub pacing: PacingPolicy,
    pub concurrency: ConcurrencyPolicy,
    pub history: HistoryPolicy,
    pub retry: RetryPolicy,
    pub fallback_text: String,
    /// Waiting longer than this for the answer, or for its next fragment,
    /// counts as a source failure.
    pub source_timeout: Option<Duration>,
    pub answer_modes: HashMap<PersonaId, AnswerMode>,
}

impl SessionConfig {
    /// Returns the answer mode of `persona`, honoring the overrides.
    #[inline]
    pub fn answer_mode(&self, id: PersonaId) -> AnswerMode {
        self.answer_modes
            .get(&id)
            .copied()
            .unwrap_or(persona(id).answer_mode)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pacing: PacingPolicy::default(),
            concurrency: ConcurrencyPolicy::default(),
            history: HistoryPolicy::default(),
            retry: RetryPolicy::default(),
            fallback_text: FALLBACK_TEXT.to_owned(),
            source_timeout: None,
            answer_modes: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_parse_pacing() {
        let ms = Duration::from_millis;
        assert_eq!("fixed:50".parse(), Ok(PacingPolicy::Fixed(ms(50))));
        assert_eq!("120".parse(), Ok(PacingPolicy::Fixed(ms(120))));
        assert_eq!(
            "jitter:80-1000".parse(),
            Ok(PacingPolicy::Jittered {
                min: ms(80),
                max: ms(1000)
            })
        );
        assert!("jitter:1000-80".parse::<PacingPolicy>().is_err());
        assert!("jitter:80".parse::<PacingPolicy>().is_err());
        assert!("warp:9".parse::<PacingPolicy>().is_err());
        assert!("fast".parse::<PacingPolicy>().is_err());
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let min = Duration::from_millis(80);
        let max = Duration::from_millis(1000);
        let policy = PacingPolicy::Jittered { min, max };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let delay = policy.next_delay_with(&mut rng);
            assert!(delay >= min && delay <= max, "{delay:?}");
        }

        let degenerate = PacingPolicy::Jittered { min: max, max: min };
        assert_eq!(degenerate.next_delay(), max);
        assert_eq!(PacingPolicy::default().next_delay(), DEFAULT_INTERVAL);
    }

    #[test]
    fn test_parse_policies() {
        assert_eq!("global".parse(), Ok(ConcurrencyPolicy::GlobalSingleFlight));
        assert_eq!("per-persona".parse(), Ok(ConcurrencyPolicy::PerPersona));
        assert!("both".parse::<ConcurrencyPolicy>().is_err());
        assert_eq!("wipe".parse(), Ok(HistoryPolicy::WipeOnSwitch));
        assert_eq!(" retain ".parse(), Ok(HistoryPolicy::Retain));
        let err = "forget".parse::<HistoryPolicy>().unwrap_err();
        assert_eq!(err.to_string(), "invalid history policy: \"forget\"");
    }

    #[test]
    fn test_answer_mode_overrides() {
        let mut config = SessionConfig::default();
        assert_eq!(config.answer_mode(PersonaId::Sloth), AnswerMode::Streaming);
        assert_eq!(config.answer_mode(PersonaId::Cat), AnswerMode::Complete);
        config
            .answer_modes
            .insert(PersonaId::Sloth, AnswerMode::Complete);
        assert_eq!(config.answer_mode(PersonaId::Sloth), AnswerMode::Complete);
    }
}
