use dialoguer::console::style;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub message: String,
    pub tone: Tone,
}

impl Status {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tone: Tone::Info,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tone: Tone::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.tone == Tone::Error
    }

    pub fn render(&self) -> String {
        match self.tone {
            Tone::Info => format!("{} {}", style("●").cyan(), self.message),
            Tone::Error => format!("{} {}", style("✗").red().bold(), style(&self.message).red()),
        }
    }

    /// Prints to stdout for info and stderr for errors.
    pub fn emit(&self) {
        if self.is_error() {
            eprintln!("{}", self.render());
        } else {
            println!("{}", self.render());
        }
    }
}
