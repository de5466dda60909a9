//! Importance scoring through a completion model.
//!
//! All memories of a batch go out in one request, joined with `;` (a `;`
//! inside a memory is sent as `,`). The model must answer with one integer
//! in 1..=10 per memory, comma separated, in input order. Anything else is a
//! parse error; nothing is guessed.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::MemoConfig;
use crate::error::{Error, OpContext, Result};
use crate::providers::{ChatMessage, CompletionProvider};
use crate::timeout::bounded;

pub const MIN_IMPORTANCE: u8 = 1;
pub const MAX_IMPORTANCE: u8 = 10;

/// Separator between memories in the scoring request.
const MEMORY_SEPARATOR: &str = ";";
const SEPARATOR_STANDIN: &str = ",";

#[derive(Clone)]
pub struct ImportanceAnnotator {
    completer: Arc<dyn CompletionProvider>,
    instruction: String,
    timeout: Duration,
}

impl ImportanceAnnotator {
    pub fn new(completer: Arc<dyn CompletionProvider>, config: &MemoConfig) -> Self {
        Self {
            completer,
            instruction: config.memory.importance_prompt.clone(),
            timeout: config.memory.timeout(),
        }
    }

    /// Score `memories`, one value per memory in input order.
    ///
    /// `context` messages are sent after the scoring instruction and before
    /// the memories.
    pub async fn score(&self, context: &[ChatMessage], memories: &[String]) -> Result<Vec<u8>> {
        if memories.is_empty() {
            return Ok(Vec::new());
        }

        let mut messages = Vec::with_capacity(context.len() + 2);
        messages.push(ChatMessage::system(&self.instruction));
        messages.extend_from_slice(context);
        messages.push(ChatMessage::user(scoring_input(memories)));

        let ctx = OpContext::new("score_importance", "-", memories.len());
        let reply = bounded(self.timeout, &ctx, async {
            self.completer
                .complete(&messages)
                .await
                .map_err(|e| Error::provider(ctx.clone(), e))
        })
        .await?;

        debug!(batch = memories.len(), reply = %reply, "Importance reply");
        parse_scores(&reply, memories.len())
    }
}

/// Join memories for the scoring request. A separator inside a memory is
/// replaced so the model still sees one entry per memory; stored content is
/// untouched.
fn scoring_input(memories: &[String]) -> String {
    memories
        .iter()
        .map(|m| m.replace(MEMORY_SEPARATOR, SEPARATOR_STANDIN))
        .collect::<Vec<_>>()
        .join(MEMORY_SEPARATOR)
}

/// Parse `"3, 7, 1"` into scores, requiring exactly `expected` values.
pub fn parse_scores(reply: &str, expected: usize) -> Result<Vec<u8>> {
    let scores = reply
        .trim()
        .split(',')
        .map(|token| {
            let token = token.trim();
            let value: u8 = token
                .parse()
                .map_err(|_| Error::Parse(format!("{token:?} is not an integer score")))?;
            if !(MIN_IMPORTANCE..=MAX_IMPORTANCE).contains(&value) {
                return Err(Error::Parse(format!(
                    "score {value} is outside {MIN_IMPORTANCE}..={MAX_IMPORTANCE}"
                )));
            }
            Ok(value)
        })
        .collect::<Result<Vec<_>>>()?;

    if scores.len() != expected {
        return Err(Error::Parse(format!(
            "expected {expected} scores, got {}",
            scores.len()
        )));
    }
    Ok(scores)
}
