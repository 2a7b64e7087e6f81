//! Passphrases from the environment or an interactive prompt.
//!
//! Lookup order for a functionary `build-bot`:
//! 1. `SIGNY_BUILD_BOT_PASSPHRASE`
//! 2. `SIGNY_PASSPHRASE`
//! 3. prompt on the output stream, read a line, ask again to confirm

use signy_keys::{KeyError, KeyResult, Passphrase, PassphraseProvider, PassphraseRequest};
use std::io::{self, BufRead, BufReader, Stderr, Stdin, Write};

/// Variable consulted for every functionary
pub const SHARED_PASSPHRASE_VAR: &str = "SIGNY_PASSPHRASE";

/// `SIGNY_<FUNCTIONARY>_PASSPHRASE`, upper-cased, with `-` and `.` as `_`.
pub fn passphrase_var(functionary: &str) -> String {
    let name: String = functionary
        .chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    format!("SIGNY_{name}_PASSPHRASE")
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Provider reading environment variables, then prompting
pub struct PromptPassphrase<R, W> {
    input: R,
    output: W,
    env: fn(&str) -> Option<String>,
}

impl PromptPassphrase<BufReader<Stdin>, Stderr> {
    /// Prompt on stderr, read stdin, consult the process environment
    pub fn stdio() -> Self {
        Self {
            input: BufReader::new(io::stdin()),
            output: io::stderr(),
            env: process_env,
        }
    }
}

impl<R: BufRead, W: Write> PromptPassphrase<R, W> {
    /// Prompt-only provider over arbitrary streams
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            env: |_| None,
        }
    }

    /// Replace the environment lookup
    pub fn with_env(mut self, env: fn(&str) -> Option<String>) -> Self {
        self.env = env;
        self
    }

    fn from_env(&self, functionary: &str) -> Option<(String, String)> {
        [passphrase_var(functionary), SHARED_PASSPHRASE_VAR.to_string()]
            .into_iter()
            .find_map(|var| (self.env)(&var).map(|value| (var, value)))
    }

    fn read_line(&mut self, prompt: &str) -> KeyResult<String> {
        let io_err = |e: io::Error| KeyError::Passphrase(format!("cannot prompt: {e}"));

        self.output.write_all(prompt.as_bytes()).map_err(io_err)?;
        self.output.flush().map_err(io_err)?;

        let mut line = String::new();
        let read = self.input.read_line(&mut line).map_err(io_err)?;
        if read == 0 {
            return Err(KeyError::Passphrase("no passphrase on input".to_string()));
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(line)
    }
}

impl<R: BufRead, W: Write> PassphraseProvider for PromptPassphrase<R, W> {
    fn passphrase(&mut self, request: &PassphraseRequest<'_>) -> KeyResult<Passphrase> {
        if let Some((var, value)) = self.from_env(request.functionary) {
            tracing::debug!(var = %var, "using passphrase from environment");
            return Passphrase::new(value);
        }

        let first = Passphrase::new(self.read_line(&request.prompt())?)?;
        let again = self.read_line("Confirm passphrase: ")?;
        if first.expose() != again {
            return Err(KeyError::Passphrase("passphrases do not match".to_string()));
        }
        Ok(first)
    }
}
