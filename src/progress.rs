//! Progress narration for the error stream.
//!
//! Renderers produce `Rendered` values without touching any stream; the
//! `Progress` sink decides how each tone is painted.
use colored::Colorize;
use std::io::Write;
use std::sync::Mutex;

/// How a line should be painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Notice,
    Heading,
    /// Standard output captured from a remote command.
    Stdout,
    /// Error output captured from a remote command.
    Stderr,
    /// Function payloads.
    Payload,
}

/// A line made of an unpainted label followed by toned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub label: String,
    pub text: String,
    pub tone: Tone,
}

impl Line {
    #[cfg(test)]
    pub fn plain_text(&self) -> String {
        format!("{}{}", self.label, self.text)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    lines: Vec<Line>,
}

impl Rendered {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(mut self, tone: Tone, text: impl Into<String>) -> Self {
        self.push(tone, "", text);
        self
    }

    pub fn labeled(mut self, label: &str, tone: Tone, text: impl Into<String>) -> Self {
        self.push(tone, label, text);
        self
    }

    pub fn push(&mut self, tone: Tone, label: &str, text: impl Into<String>) {
        self.lines.push(Line {
            label: label.to_string(),
            text: text.into(),
            tone,
        });
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Uncolored text, lines joined by newlines.
    #[cfg(test)]
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(Line::plain_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct Progress {
    out: Mutex<Box<dyn Write + Send>>,
    color: bool,
}

impl Progress {
    pub fn stderr(color: bool) -> Self {
        Self::to_writer(std::io::stderr(), color)
    }

    pub fn to_writer(writer: impl Write + Send + 'static, color: bool) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
            color,
        }
    }

    pub fn notice(&self, text: &str) {
        self.write(&self.paint(Tone::Notice, text));
    }

    pub fn heading(&self, text: &str) {
        self.write(&self.paint(Tone::Heading, text));
    }

    /// `NAME: STATUS` header printed before a step's rendered body.
    pub fn step_header(&self, name: &str, status: &str) {
        let line = format!(
            "{}{}",
            self.paint(Tone::Heading, name),
            self.paint(Tone::Notice, &format!(": {status}"))
        );
        self.write(&line);
    }

    pub fn warn(&self, text: &str) {
        let line = if self.color {
            text.yellow().to_string()
        } else {
            text.to_string()
        };
        self.write(&line);
    }

    pub fn rendered(&self, rendered: &Rendered) {
        for line in rendered.lines() {
            let painted = format!("{}{}", line.label, self.paint(line.tone, &line.text));
            self.write(&painted);
        }
    }

    fn paint(&self, tone: Tone, text: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        match tone {
            Tone::Plain => text.to_string(),
            Tone::Notice => text.blue().to_string(),
            Tone::Heading => text.blue().bold().to_string(),
            Tone::Stdout | Tone::Payload => text.green().to_string(),
            Tone::Stderr => text.red().to_string(),
        }
    }

    fn write(&self, line: &str) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            tracing::debug!(error = %err, "progress write failed");
        }
    }
}
