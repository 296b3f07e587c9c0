//! User interaction seam.
//!
//! Agents never talk to the terminal directly. Everything they show or ask
//! goes through a [`Prompter`], so the workflow runs unchanged against a
//! real terminal ([`TerminalPrompter`]) or a queue of canned answers
//! ([`ScriptedPrompter`]).

use setup_agent_error::{Error, Result};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Validates free-text input; `Err` carries the message shown to the user
pub type Validator<'a> = &'a dyn Fn(&str) -> std::result::Result<(), String>;

pub trait Prompter: Send + Sync {
    /// Pick one of `choices`, returning its index
    fn select(&self, message: &str, choices: &[String], default: usize) -> Result<usize>;

    /// Pick any number of `choices`, returning their indices
    fn multi_select(&self, message: &str, choices: &[String], defaults: &[bool])
        -> Result<Vec<usize>>;

    fn input(&self, message: &str) -> Result<String>;

    /// Ask until `validator` accepts the answer
    fn input_validated(&self, message: &str, validator: Validator<'_>) -> Result<String>;

    /// Hidden input
    fn password(&self, message: &str) -> Result<String>;

    fn confirm(&self, message: &str, default: bool) -> Result<bool>;

    fn wait_for_enter(&self, message: &str) -> Result<()>;

    /// Show text to the user
    fn announce(&self, text: &str);
}

fn prompt_error(e: dialoguer::Error) -> Error {
    Error::prompt_failed(e.to_string())
        .with_operation("prompter::interact")
        .set_source(e)
}

/// Prompts on the controlling terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    pub fn new() -> Self {
        Self
    }
}

impl Prompter for TerminalPrompter {
    fn select(&self, message: &str, choices: &[String], default: usize) -> Result<usize> {
        dialoguer::Select::new()
            .with_prompt(message)
            .items(choices)
            .default(default.min(choices.len().saturating_sub(1)))
            .interact()
            .map_err(prompt_error)
    }

    fn multi_select(
        &self,
        message: &str,
        choices: &[String],
        defaults: &[bool],
    ) -> Result<Vec<usize>> {
        dialoguer::MultiSelect::new()
            .with_prompt(message)
            .items(choices)
            .defaults(defaults)
            .interact()
            .map_err(prompt_error)
    }

    fn input(&self, message: &str) -> Result<String> {
        dialoguer::Input::<String>::new()
            .with_prompt(message)
            .allow_empty(true)
            .interact_text()
            .map_err(prompt_error)
    }

    fn input_validated(&self, message: &str, validator: Validator<'_>) -> Result<String> {
        dialoguer::Input::<String>::new()
            .with_prompt(message)
            .allow_empty(true)
            .validate_with(|s: &String| validator(s))
            .interact_text()
            .map_err(prompt_error)
    }

    fn password(&self, message: &str) -> Result<String> {
        dialoguer::Password::new()
            .with_prompt(message)
            .allow_empty_password(true)
            .interact()
            .map_err(prompt_error)
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        dialoguer::Confirm::new()
            .with_prompt(message)
            .default(default)
            .interact()
            .map_err(prompt_error)
    }

    fn wait_for_enter(&self, message: &str) -> Result<()> {
        self.input(message).map(|_| ())
    }

    fn announce(&self, text: &str) {
        println!("{}", text);
    }
}

/// A canned answer for [`ScriptedPrompter`]
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Select the choice with this label
    Choice(String),
    /// Multi-select the choices with these labels
    Choices(Vec<String>),
    /// Free text, passwords included
    Text(String),
    Confirm(bool),
    /// Accept whatever default the prompt offers
    Default,
}

impl Answer {
    pub fn choice(label: impl Into<String>) -> Self {
        Answer::Choice(label.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Answer::Text(text.into())
    }
}

/// Serves queued answers and records everything shown
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<Answer>>,
    transcript: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            transcript: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, answer: Answer) {
        if let Ok(mut answers) = self.answers.lock() {
            answers.push_back(answer);
        }
    }

    /// Every prompt and announcement, in order
    pub fn transcript(&self) -> Vec<String> {
        self.transcript
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.answers.lock().map(|a| a.len()).unwrap_or_default()
    }

    fn record(&self, line: &str) {
        if let Ok(mut transcript) = self.transcript.lock() {
            transcript.push(line.to_string());
        }
    }

    fn next(&self, message: &str) -> Result<Answer> {
        self.record(message);
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .ok_or_else(|| {
                Error::prompt_failed("no scripted answer left")
                    .with_operation("scripted_prompter::next")
                    .with_context("prompt", message)
            })
    }

    fn mismatch(message: &str, answer: &Answer) -> Error {
        Error::prompt_failed(format!("scripted answer {:?} does not fit", answer))
            .with_operation("scripted_prompter::next")
            .with_context("prompt", message)
    }

    fn index_of(message: &str, choices: &[String], label: &str) -> Result<usize> {
        choices.iter().position(|c| c == label).ok_or_else(|| {
            Error::prompt_failed(format!("no choice labelled '{}'", label))
                .with_operation("scripted_prompter::select")
                .with_context("prompt", message)
                .with_context("choices", choices.join(" | "))
        })
    }
}

impl Prompter for ScriptedPrompter {
    fn select(&self, message: &str, choices: &[String], default: usize) -> Result<usize> {
        match self.next(message)? {
            Answer::Choice(label) => Self::index_of(message, choices, &label),
            Answer::Default => Ok(default),
            other => Err(Self::mismatch(message, &other)),
        }
    }

    fn multi_select(
        &self,
        message: &str,
        choices: &[String],
        defaults: &[bool],
    ) -> Result<Vec<usize>> {
        match self.next(message)? {
            Answer::Choices(labels) => labels
                .iter()
                .map(|l| Self::index_of(message, choices, l))
                .collect(),
            Answer::Choice(label) => Ok(vec![Self::index_of(message, choices, &label)?]),
            Answer::Default => Ok(defaults
                .iter()
                .enumerate()
                .filter(|(_, on)| **on)
                .map(|(i, _)| i)
                .collect()),
            other => Err(Self::mismatch(message, &other)),
        }
    }

    fn input(&self, message: &str) -> Result<String> {
        match self.next(message)? {
            Answer::Text(text) => Ok(text),
            Answer::Default => Ok(String::new()),
            other => Err(Self::mismatch(message, &other)),
        }
    }

    fn input_validated(&self, message: &str, validator: Validator<'_>) -> Result<String> {
        // Rejected answers are dropped, like a user retyping
        loop {
            let text = self.input(message)?;
            match validator(&text) {
                Ok(()) => return Ok(text),
                Err(msg) => self.record(&msg),
            }
        }
    }

    fn password(&self, message: &str) -> Result<String> {
        self.input(message)
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        match self.next(message)? {
            Answer::Confirm(yes) => Ok(yes),
            Answer::Default => Ok(default),
            other => Err(Self::mismatch(message, &other)),
        }
    }

    fn wait_for_enter(&self, message: &str) -> Result<()> {
        self.input(message).map(|_| ())
    }

    fn announce(&self, text: &str) {
        self.record(text);
    }
}

/// Owned label list for a choice prompt
pub fn labels<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
