use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::helper::tokenize;

/// Salience assigned to a sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceScore {
    /// Position in the input.
    pub index: usize,
    /// Score; higher is more salient.
    pub score: f64,
}

const MIN_TERM_LEN: usize = 3;

/// Scores sentences by the average span-wide frequency of their terms, plus
/// one point per boosted term they mention. Returns scores best first; ties
/// keep input order.
#[must_use]
pub fn score_sentences(sentences: &[String], boost_terms: &[String]) -> Vec<SentenceScore> {
    let tokenized: Vec<Vec<String>> = sentences
        .iter()
        .map(|sentence| {
            tokenize(sentence)
                .into_iter()
                .filter(|token| token.chars().count() >= MIN_TERM_LEN)
                .collect()
        })
        .collect();
    let mut frequency: HashMap<&str, u32> = HashMap::new();
    for tokens in &tokenized {
        for token in tokens {
            *frequency.entry(token.as_str()).or_default() += 1;
        }
    }
    let boosts: Vec<Vec<String>> = boost_terms.iter().map(|term| tokenize(term)).collect();

    let mut scored: Vec<SentenceScore> = tokenized
        .iter()
        .enumerate()
        .map(|(index, tokens)| {
            let total: u32 = tokens
                .iter()
                .map(|token| frequency.get(token.as_str()).copied().unwrap_or_default())
                .sum();
            let base = if tokens.is_empty() {
                0.0
            } else {
                f64::from(total) / f64::from(u32::try_from(tokens.len()).unwrap_or(u32::MAX))
            };
            let words = tokenize(&sentences[index]);
            let boosted = boosts
                .iter()
                .filter(|boost| !boost.is_empty() && contains_run(&words, boost))
                .count();
            SentenceScore {
                index,
                score: base + f64::from(u32::try_from(boosted).unwrap_or(u32::MAX)),
            }
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.index.cmp(&b.index)));
    scored
}

fn contains_run(words: &[String], run: &[String]) -> bool {
    words.windows(run.len()).any(|window| window == run)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn repeated_terms_rank_first() {
        let input = sentences(&[
            "The weather was fine.",
            "Music keeps me going, music every day.",
            "I play music at night.",
        ]);
        let ranked = score_sentences(&input, &[]);
        assert_eq!(ranked[0].index, 1);
    }

    #[test]
    fn boosted_entities_win() {
        let input = sentences(&["Work was long today.", "My family visited and it was lovely."]);
        let ranked = score_sentences(&input, &["family".to_string()]);
        assert_eq!(ranked[0].index, 1);
        assert!(ranked[0].score >= 1.0);
    }
}
