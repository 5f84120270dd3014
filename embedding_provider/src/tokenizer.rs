//! Lexical tokenizer: Korean morphological analysis through lindera's
//! embedded ko-dic dictionary, with an English/number pass on every text.
//! When the dictionary cannot be loaded the tokenizer degrades to plain
//! script-run splitting; indexing never aborts because of it.

use lindera::dictionary::load_dictionary;
use lindera::mode::Mode;
use lindera::segmenter::Segmenter;
use lindera::tokenizer::Tokenizer as LinderaTokenizer;
use tracing::warn;

/// POS classes kept from the morphological analysis: general noun, proper
/// noun, foreign word, number.
const KEPT_POS: &[&str] = &["NNG", "NNP", "SL", "SN"];

pub struct TextTokenizer {
    analyzer: Option<LinderaTokenizer>,
}

impl Default for TextTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextTokenizer {
    pub fn new() -> Self {
        let analyzer = match load_dictionary("embedded://ko-dic") {
            Ok(dictionary) => {
                let segmenter = Segmenter::new(Mode::Normal, dictionary, None);
                Some(LinderaTokenizer::new(segmenter))
            }
            Err(e) => {
                warn!(error = %e, "ko-dic unavailable, falling back to script-run tokenization");
                None
            }
        };
        Self { analyzer }
    }

    /// Fallback-only instance, used by tests and as the degraded path.
    pub fn without_analyzer() -> Self {
        Self { analyzer: None }
    }

    /// Capability flag recorded in settings.
    pub fn korean_available(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Tokenize arbitrary text. The result may be empty; callers decide how
    /// to treat that.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let mut tokens: Vec<String> = Vec::new();

        if contains_hangul(text) {
            match &self.analyzer {
                Some(analyzer) => match analyzer.tokenize(text) {
                    Ok(morphs) => {
                        for mut token in morphs {
                            let pos = token.details().first().map(|d| d.to_string());
                            let keep = pos
                                .as_deref()
                                .map(|p| KEPT_POS.contains(&p))
                                .unwrap_or(false);
                            if !keep {
                                continue;
                            }
                            let form = token.text.trim().to_lowercase();
                            if form.chars().count() >= 2 {
                                tokens.push(form);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "morphological analysis failed, using fallback split");
                        tokens.extend(hangul_runs(text));
                    }
                },
                None => tokens.extend(hangul_runs(text)),
            }
        }

        // Latin words and numbers are extracted regardless of script.
        tokens.extend(latin_and_number_runs(text));

        dedup_preserving_order(tokens)
    }
}

fn contains_hangul(text: &str) -> bool {
    text.chars().any(is_hangul)
}

fn is_hangul(ch: char) -> bool {
    matches!(ch,
        '\u{ac00}'..='\u{d7af}'
        | '\u{1100}'..='\u{11ff}'
        | '\u{3130}'..='\u{318f}'
        | '\u{a960}'..='\u{a97f}'
        | '\u{d7b0}'..='\u{d7ff}')
}

fn hangul_runs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut run = String::new();
    for ch in text.chars() {
        if is_hangul(ch) {
            run.push(ch);
        } else if !run.is_empty() {
            if run.chars().count() >= 2 {
                out.push(std::mem::take(&mut run));
            } else {
                run.clear();
            }
        }
    }
    if run.chars().count() >= 2 {
        out.push(run);
    }
    out
}

fn latin_and_number_runs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut letters = String::new();
    let mut digits = String::new();
    let mut flush = |letters: &mut String, digits: &mut String, out: &mut Vec<String>| {
        if letters.len() >= 2 {
            out.push(letters.to_lowercase());
        }
        letters.clear();
        if !digits.is_empty() {
            out.push(std::mem::take(digits));
        }
    };
    for ch in text.chars() {
        if ch.is_ascii_alphabetic() {
            if !digits.is_empty() {
                flush(&mut letters, &mut digits, &mut out);
            }
            letters.push(ch);
        } else if ch.is_ascii_digit() {
            if !letters.is_empty() {
                flush(&mut letters, &mut digits, &mut out);
            }
            digits.push(ch);
        } else {
            flush(&mut letters, &mut digits, &mut out);
        }
    }
    flush(&mut letters, &mut digits, &mut out);
    out
}

fn dedup_preserving_order(tokens: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokens.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_words_are_lowercased_with_min_length() {
        let t = TextTokenizer::without_analyzer();
        assert_eq!(
            t.tokenize("The Report was Final"),
            vec!["the", "report", "was", "final"]
        );
        // Single letters drop, numbers stay.
        assert_eq!(t.tokenize("Q4 a 2026"), vec!["4", "2026"]);
    }

    #[test]
    fn fallback_splits_hangul_runs() {
        let t = TextTokenizer::without_analyzer();
        let tokens = t.tokenize("예산 조정 보고서");
        assert!(tokens.contains(&"예산".to_string()));
        assert!(tokens.contains(&"조정".to_string()));
        assert!(tokens.contains(&"보고서".to_string()));
    }

    #[test]
    fn morphological_path_keeps_content_nouns() {
        let t = TextTokenizer::new();
        // Works through either the analyzer or the fallback.
        let tokens = t.tokenize("Q4 예산 조정");
        assert!(tokens.contains(&"예산".to_string()));
        assert!(tokens.contains(&"조정".to_string()));
        assert!(tokens.contains(&"4".to_string()));
    }

    #[test]
    fn empty_and_symbol_only_text_yields_no_tokens() {
        let t = TextTokenizer::without_analyzer();
        assert!(t.tokenize("").is_empty());
        assert!(t.tokenize("   !!! ...").is_empty());
    }

    #[test]
    fn tokens_are_deduplicated_in_order() {
        let t = TextTokenizer::without_analyzer();
        assert_eq!(t.tokenize("budget budget plan"), vec!["budget", "plan"]);
    }
}
