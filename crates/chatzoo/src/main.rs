//! Chat with the zoo in the terminal.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::time::Duration;

use chatzoo::core::persona::persona;
use chatzoo::core::store::{Message, MessageId, RevealState, Role, StoreEvent};
use chatzoo::core::{
    RejectReason, Session, SessionBuilder, SessionConfig, Submission,
};
use chatzoo::{Command, Settings, SourceSettings, export_conversation};
use chatzoo_mock_source::CannedSource;
use chatzoo_model::{AnswerSource, PersonaId};
use chatzoo_openai_source::OpenAISource;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";
const CANNED_LATENCY: Duration = Duration::from_millis(400);

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };
    let session = match settings.source {
        SourceSettings::OpenAI(config) => {
            build_session(OpenAISource::new(config), settings.session)
        }
        SourceSettings::Canned => {
            println!(
                "{}",
                "OPENAI_API_KEY is not set, the animals will make things up."
                    .dimmed()
            );
            let source = CannedSource::new().with_latency(CANNED_LATENCY);
            build_session(source, settings.session)
        }
    };

    let mut events = session.subscribe();
    let mut lines = spawn_line_reader();
    let mut view = ChatView::new();

    println!("Welcome to the zoo! Type /help to see what you can do.");
    print_greeting(&session);
    print_prompt();

    loop {
        select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                let Some(command) = Command::parse(&line) else {
                    print_prompt();
                    continue;
                };
                if !handle_command(&session, &mut view, command) {
                    break;
                }
            }
            Some(event) = events.recv() => {
                view.render(&session, event);
            }
            _ = sleep(Duration::from_millis(100)), if view.is_waiting() => {
                view.tick();
            }
        }
    }

    view.detach();
}

fn build_session<S: AnswerSource + 'static>(
    source: S,
    config: SessionConfig,
) -> Session {
    SessionBuilder::with_answer_source(source)
        .with_config(config)
        .build()
}

/// Handles a command, returns `false` if the user wants to leave.
fn handle_command(
    session: &Session,
    view: &mut ChatView,
    command: Command,
) -> bool {
    match command {
        Command::Prompt(prompt) => match session.send_message(&prompt) {
            Submission::Accepted { reply_message, .. } => {
                view.expect_reply(session.active_persona(), reply_message);
                return true;
            }
            Submission::Rejected(RejectReason::Busy) => {
                println!(
                    "{}",
                    "Still answering, wait a moment or /stop it.".yellow()
                );
            }
            Submission::Rejected(RejectReason::EmptyPrompt) => {}
        },
        Command::Switch(persona_id) => {
            view.detach();
            if persona_id == session.active_persona() {
                println!("You are already talking to {persona_id}.");
            } else {
                session.switch_persona(persona_id);
                print_greeting(session);
                print_history(&session.conversation(persona_id));
            }
        }
        Command::Stop => {
            if session.cancel() {
                // The reply line is ended when the abort shows up.
                return true;
            }
            println!("Nothing to stop.");
        }
        Command::History => {
            print_history(&session.conversation(session.active_persona()));
        }
        Command::Export => {
            match export_conversation(session, session.active_persona()) {
                Ok(json) => println!("{json}"),
                Err(err) => error!("failed to export the conversation: {err}"),
            }
        }
        Command::Dismiss => session.dismiss_error(),
        Command::Help => println!("{}", Command::HELP),
        Command::Quit => return false,
        Command::Unknown(line) => {
            println!("Unknown command {line}, try /help.");
        }
    }
    print_prompt();
    true
}

/// Prints the reply being revealed as it grows.
struct ChatView {
    reply: Option<(PersonaId, MessageId)>,
    printed: String,
    spinner: Option<ProgressBar>,
    spinner_style: ProgressStyle,
}

impl ChatView {
    fn new() -> Self {
        let spinner_style = ProgressStyle::with_template("{spinner} {wide_msg}")
            .unwrap()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        Self {
            reply: None,
            printed: String::new(),
            spinner: None,
            spinner_style,
        }
    }

    #[inline]
    fn is_waiting(&self) -> bool {
        self.spinner.is_some()
    }

    fn tick(&self) {
        if let Some(spinner) = &self.spinner {
            spinner.inc(1);
        }
    }

    fn expect_reply(&mut self, persona_id: PersonaId, id: MessageId) {
        self.detach();
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(self.spinner_style.clone());
        spinner.set_message(format!(
            "{} is thinking...",
            persona(persona_id).display_name
        ));
        self.spinner = Some(spinner);
        self.reply = Some((persona_id, id));
    }

    /// Stops following the current reply.
    fn detach(&mut self) {
        self.clear_spinner();
        if self.reply.take().is_some() && !self.printed.is_empty() {
            println!();
        }
        self.printed.clear();
    }

    fn clear_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn is_current(&self, persona_id: PersonaId, id: &MessageId) -> bool {
        self.reply
            .as_ref()
            .is_some_and(|(p, current)| *p == persona_id && current == id)
    }

    fn render(&mut self, session: &Session, event: StoreEvent) {
        match event {
            StoreEvent::TextUpdated { persona, id, text }
                if self.is_current(persona, &id) =>
            {
                self.print_text(persona, &text);
            }
            StoreEvent::StateChanged { persona, id, state }
                if self.is_current(persona, &id) =>
            {
                self.clear_spinner();
                if state == RevealState::Aborted {
                    print!(" {}", "(stopped)".dimmed());
                }
                if !self.printed.is_empty() || state == RevealState::Aborted {
                    println!();
                }
                self.reply = None;
                self.printed.clear();
                if let Some(error) = session.last_error() {
                    println!(
                        "{}{} {}",
                        BAR_CHAR.red(),
                        error.red(),
                        "(/dismiss to hide)".dimmed()
                    );
                }
                print_prompt();
            }
            StoreEvent::Cleared(persona) => {
                if self.reply.as_ref().is_some_and(|(p, _)| *p == persona) {
                    self.detach();
                }
            }
            _ => {}
        }
    }

    fn print_text(&mut self, persona_id: PersonaId, text: &str) {
        if self.printed.is_empty() {
            self.clear_spinner();
            print!("{}{} ", BAR_CHAR.bright_cyan(), persona(persona_id).emoji);
        }
        match text.strip_prefix(self.printed.as_str()) {
            Some(grown) => print!("{}", grown.bright_white()),
            // Replaced by the fallback text.
            None => print!("\n{}{}", BAR_CHAR.bright_cyan(), text.yellow()),
        }
        std::io::stdout().flush().ok();
        self.printed.clear();
        self.printed.push_str(text);
    }
}

fn print_prompt() {
    print!("> ");
    std::io::stdout().flush().ok();
}

fn print_greeting(session: &Session) {
    let persona = persona(session.active_persona());
    println!(
        "{} You are talking to {}. {}",
        persona.emoji,
        persona.display_name.bold(),
        persona.description.dimmed()
    );
}

fn print_history(conversation: &[Message]) {
    for msg in conversation {
        let persona = persona(msg.persona());
        match msg.role() {
            Role::User => println!("{}{}", "> ".dimmed(), msg.text()),
            Role::Assistant => {
                let suffix = match msg.reveal_state() {
                    RevealState::Aborted => " (stopped)",
                    RevealState::Revealing => " ...",
                    RevealState::Complete => "",
                };
                println!(
                    "{}{} {}{}",
                    BAR_CHAR.bright_cyan(),
                    persona.emoji,
                    msg.text().bright_white(),
                    suffix.dimmed()
                );
            }
        }
    }
}

/// Reads stdin on a separate task, so that replies keep revealing while the
/// user is typing.
fn spawn_line_reader() -> mpsc::UnboundedReceiver<String> {
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = io::BufReader::new(io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    error!("error reading input: {err}");
                    break;
                }
            }
        }
    });
    line_rx
}
