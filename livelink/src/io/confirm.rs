//! Interactive yes/no confirmation.

use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};

/// Source of explicit user confirmation for state-changing steps.
pub trait Confirm {
    /// Ask `prompt`; `true` only on an affirmative answer.
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Prompts on a writer and reads answers line by line until one is valid.
pub struct ConsoleConfirm<R, W> {
    input: R,
    output: W,
}

impl ConsoleConfirm<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleConfirm<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Confirm for ConsoleConfirm<R, W> {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        loop {
            write!(self.output, "{prompt} [y/n] ").context("write prompt")?;
            self.output.flush().context("flush prompt")?;

            let mut line = String::new();
            let read = self.input.read_line(&mut line).context("read answer")?;
            if read == 0 {
                bail!("no answer to {prompt:?} (input closed)");
            }
            match parse_answer(&line) {
                Some(answer) => return Ok(answer),
                None => writeln!(self.output, "Invalid input. Please enter y/yes or n/no")
                    .context("write prompt")?,
            }
        }
    }
}

fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}
