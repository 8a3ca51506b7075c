//! Summarization strategies for hierarchical abstraction.
//!
//! The actual summarization logic (an LLM call, usually) is provided by the
//! user via closures or trait implementations, keeping this crate
//! lightweight. The tree builder joins the texts of one cluster with a
//! delimiter and hands the block to a [`Summarizer`]; any length cap is the
//! summarizer's own policy.

use crate::error::{Error, Result};

/// Separator placed between texts of one cluster before summarization.
pub const DEFAULT_DELIMITER: &str = "\n\n---\n\n";

/// Prompt template with a `{context}` slot.
pub const DEFAULT_PROMPT: &str =
    "Here is a document excerpt:\n\n{context}\n\nPlease provide a detailed summary:";

const CONTEXT_SLOT: &str = "{context}";

/// Condenses a block of text into a summary.
pub trait Summarizer: Send + Sync {
    /// Summarize one block of text.
    fn summarize(&self, text: &str) -> Result<String>;
}

impl<S: Summarizer + ?Sized> Summarizer for &S {
    fn summarize(&self, text: &str) -> Result<String> {
        (**self).summarize(text)
    }
}

impl<S: Summarizer + ?Sized> Summarizer for Box<S> {
    fn summarize(&self, text: &str) -> Result<String> {
        (**self).summarize(text)
    }
}

/// Join the texts of one cluster in the given order.
pub fn join_cluster_texts<'a, I>(texts: I, delimiter: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    texts.into_iter().collect::<Vec<_>>().join(delimiter)
}

/// A truncating summarizer (for testing and offline baselines).
///
/// Returns the input unchanged unless it exceeds `max_chars`, in which case
/// it is cut on a character boundary and suffixed with `"..."`.
#[derive(Debug, Clone, Default)]
pub struct TruncateSummarizer {
    /// Maximum length in characters, including the ellipsis. Caps below 3
    /// cut without one.
    pub max_chars: Option<usize>,
}

impl TruncateSummarizer {
    /// Create a summarizer that returns its input unchanged.
    pub fn new() -> Self {
        Self { max_chars: None }
    }

    /// Set maximum length.
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }
}

impl Summarizer for TruncateSummarizer {
    fn summarize(&self, text: &str) -> Result<String> {
        match self.max_chars {
            Some(max) if max < 3 && text.chars().count() > max => {
                Ok(text.chars().take(max).collect())
            }
            Some(max) if text.chars().count() > max => {
                let mut truncated: String = text.chars().take(max.saturating_sub(3)).collect();
                truncated.push_str("...");
                Ok(truncated)
            }
            _ => Ok(text.to_string()),
        }
    }
}

/// A function-based summarizer.
#[derive(Clone)]
pub struct FnSummarizer<F> {
    f: F,
}

impl<F> FnSummarizer<F> {
    /// Create a summarizer from a function.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Summarizer for FnSummarizer<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn summarize(&self, text: &str) -> Result<String> {
        (self.f)(text)
    }
}

/// Create a summarizer from a closure.
pub fn from_fn<F>(f: F) -> FnSummarizer<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    FnSummarizer::new(f)
}

/// Renders a prompt around the cluster text and forwards it to a
/// completion function.
#[derive(Clone)]
pub struct PromptSummarizer<F> {
    template: String,
    complete: F,
}

impl<F> PromptSummarizer<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    /// Summarizer using [`DEFAULT_PROMPT`].
    pub fn new(complete: F) -> Self {
        Self {
            template: DEFAULT_PROMPT.to_string(),
            complete,
        }
    }

    /// Replace the template. It must contain a `{context}` slot.
    pub fn with_template(mut self, template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains(CONTEXT_SLOT) {
            return Err(Error::InvalidParameter {
                name: "template",
                message: "must contain a {context} slot",
            });
        }
        self.template = template;
        Ok(self)
    }

    /// The prompt sent for `context`.
    pub fn render(&self, context: &str) -> String {
        self.template.replace(CONTEXT_SLOT, context)
    }
}

impl<F> Summarizer for PromptSummarizer<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn summarize(&self, text: &str) -> Result<String> {
        let summary = (self.complete)(&self.render(text))?;
        Ok(summary.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_cluster_texts() {
        let joined = join_cluster_texts(["a", "b", "c"], DEFAULT_DELIMITER);
        assert_eq!(joined, "a\n\n---\n\nb\n\n---\n\nc");
        assert_eq!(join_cluster_texts(["only"], "|"), "only");
    }

    #[test]
    fn test_truncate_summarizer() {
        let s = TruncateSummarizer::new().with_max_chars(6);
        assert_eq!(s.summarize("abcdefgh").unwrap(), "abc...");
        assert_eq!(s.summarize("abc").unwrap(), "abc");
        assert_eq!(TruncateSummarizer::new().summarize("unchanged").unwrap(), "unchanged");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = TruncateSummarizer::new().with_max_chars(5);
        assert_eq!(s.summarize("ééééééé").unwrap(), "éé...");
    }

    #[test]
    fn test_truncate_below_ellipsis_width_stays_within_cap() {
        let s = TruncateSummarizer::new().with_max_chars(2);
        assert_eq!(s.summarize("abcdef").unwrap(), "ab");
        assert_eq!(s.summarize("ab").unwrap(), "ab");
        assert_eq!(TruncateSummarizer::new().with_max_chars(0).summarize("abc").unwrap(), "");
    }

    #[test]
    fn test_fn_summarizer() {
        let s = from_fn(|text: &str| Ok(text.to_uppercase()));
        assert_eq!(s.summarize("abc").unwrap(), "ABC");
    }

    #[test]
    fn test_prompt_summarizer_renders_default_template() {
        let s = PromptSummarizer::new(|prompt: &str| Ok(format!("  {}  ", prompt.len())));
        let prompt = s.render("CTX");
        assert!(prompt.starts_with("Here is a document excerpt:\n\nCTX"));
        assert!(prompt.ends_with("Please provide a detailed summary:"));
        assert_eq!(s.summarize("CTX").unwrap(), prompt.len().to_string());
    }

    #[test]
    fn test_prompt_template_needs_slot() {
        let s = PromptSummarizer::new(|p: &str| Ok(p.to_string()));
        assert!(s.clone().with_template("no slot").is_err());
        let s = s.with_template("<{context}>").unwrap();
        assert_eq!(s.summarize("x").unwrap(), "<x>");
    }

    #[test]
    fn test_summarizer_errors_propagate() {
        let s = from_fn(|_: &str| Err(Error::Summarization("offline".into())));
        assert_eq!(
            s.summarize("x").unwrap_err(),
            Error::Summarization("offline".into())
        );
    }
}
