use chatzoo_model::PersonaId;

/// A line typed in the chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// A prompt for the active persona.
    Prompt(String),
    /// Talk to another persona.
    Switch(PersonaId),
    /// Stop revealing the current reply.
    Stop,
    /// Print the conversation with the active persona.
    History,
    /// Print the conversation with the active persona as JSON.
    Export,
    /// Hide the last error.
    Dismiss,
    /// Print the available commands.
    Help,
    /// Leave the zoo.
    Quit,
    /// A slash command nobody knows.
    Unknown(String),
}

impl Command {
    /// Help text listing the commands.
    pub const HELP: &str = "\
/cat, /goldfish, /sloth  talk to another persona
/stop                    stop the current reply
/history                 show the conversation
/export                  print the conversation as JSON
/dismiss                 hide the last error
/help                    show this help
/quit                    leave the zoo";

    /// Parses a line of input. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(name) = line.strip_prefix('/') else {
            return Some(Command::Prompt(line.to_owned()));
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "stop" => Command::Stop,
            "history" => Command::History,
            "export" => Command::Export,
            "dismiss" => Command::Dismiss,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => match other.parse() {
                Ok(persona) => Command::Switch(persona),
                Err(_) => Command::Unknown(line.to_owned()),
            },
        };
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Command::parse("   \n"), None);
        assert_eq!(
            Command::parse("  hello there \n"),
            Some(Command::Prompt("hello there".to_owned()))
        );
        assert_eq!(
            Command::parse("/Sloth"),
            Some(Command::Switch(PersonaId::Sloth))
        );
        assert_eq!(Command::parse("/stop"), Some(Command::Stop));
        assert_eq!(Command::parse("/exit"), Some(Command::Quit));
        assert_eq!(
            Command::parse("/dog"),
            Some(Command::Unknown("/dog".to_owned()))
        );
    }
}
