//! Single-character control commands for the dev server's interactive stdin

/// Commands understood by `flutter run`'s interactive terminal.
///
/// Each command is written as one ASCII character followed by a newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    /// Hot reload (`r`)
    Reload,
    /// Hot restart (`R`)
    Restart,
    /// Graceful quit (`q`)
    Quit,
}

impl ControlCommand {
    /// The character written to stdin for this command
    pub fn as_char(&self) -> char {
        match self {
            ControlCommand::Reload => 'r',
            ControlCommand::Restart => 'R',
            ControlCommand::Quit => 'q',
        }
    }

    /// Wire representation, including the trailing newline
    pub fn to_line(&self) -> String {
        format!("{}\n", self.as_char())
    }

    pub fn description(&self) -> &'static str {
        match self {
            ControlCommand::Reload => "hot reload",
            ControlCommand::Restart => "hot restart",
            ControlCommand::Quit => "quit",
        }
    }
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_char())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_chars() {
        assert_eq!(ControlCommand::Reload.as_char(), 'r');
        assert_eq!(ControlCommand::Restart.as_char(), 'R');
        assert_eq!(ControlCommand::Quit.as_char(), 'q');
    }

    #[test]
    fn test_to_line_appends_newline() {
        assert_eq!(ControlCommand::Reload.to_line(), "r\n");
        assert_eq!(ControlCommand::Restart.to_line(), "R\n");
        assert_eq!(ControlCommand::Quit.to_line(), "q\n");
    }

    #[test]
    fn test_display() {
        assert_eq!(ControlCommand::Restart.to_string(), "hot restart (R)");
    }
}
