//! Local relevance ranking used when the semantic memory service is
//! unreachable. Word-set Jaccard similarity over whitespace tokens; no
//! stemming, no weighting.

use std::collections::HashSet;

use crate::domain::chat::ChatRecord;

/// Minimum score a historical exchange must reach to be offered as context.
pub const RELEVANCE_THRESHOLD: f64 = 0.6;

/// Upper bound on exchanges offered as context, fallback and service alike.
pub const MAX_RELEVANT_TURNS: usize = 5;

/// Jaccard index over lowercased whitespace-token sets. Symmetric,
/// deterministic, `0.0` when both texts tokenize to nothing.
pub fn score(query: &str, candidate: &str) -> f64 {
    let query_tokens = tokens(query);
    let candidate_tokens = tokens(candidate);

    let union = query_tokens.union(&candidate_tokens).count();
    if union == 0 {
        return 0.0;
    }

    let intersection = query_tokens.intersection(&candidate_tokens).count();
    intersection as f64 / union as f64
}

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase().split_whitespace().map(str::to_string).collect()
}

/// Ranks `history` against `query` per the fallback policy: each record
/// scores as the better of its two sides, records below
/// [`RELEVANCE_THRESHOLD`] are dropped, the rest are ordered by descending
/// score and capped at [`MAX_RELEVANT_TURNS`]. The sort is stable, so tied
/// records keep their chronological order.
pub fn rank_history(query: &str, history: &[ChatRecord]) -> Vec<ChatRecord> {
    let mut scored: Vec<(f64, &ChatRecord)> = history
        .iter()
        .filter_map(|record| {
            let best = score(query, &record.user_message).max(score(query, &record.bot_response));
            (best >= RELEVANCE_THRESHOLD).then_some((best, record))
        })
        .collect();

    scored.sort_by(|left, right| right.0.total_cmp(&left.0));
    scored.into_iter().take(MAX_RELEVANT_TURNS).map(|(_, record)| record.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::{rank_history, score, MAX_RELEVANT_TURNS, RELEVANCE_THRESHOLD};
    use crate::domain::chat::ChatRecord;

    const QUERY: &str = "alpha bravo charlie delta echo foxtrot golf hotel india juliett \
                         kilo lima mike november oscar papa quebec romeo sierra tango";

    fn query_prefix(words: usize) -> String {
        QUERY.split_whitespace().take(words).collect::<Vec<_>>().join(" ")
    }

    fn record(user_message: &str, bot_response: &str) -> ChatRecord {
        ChatRecord::new("s-1", user_message, bot_response).expect("valid record")
    }

    #[test]
    fn identical_texts_score_one() {
        assert_eq!(score("leave policy", "leave policy"), 1.0);
    }

    #[test]
    fn score_is_symmetric() {
        let a = "how do I submit a leave request";
        let b = "leave request form";
        assert_eq!(score(a, b), score(b, a));
    }

    #[test]
    fn empty_texts_score_zero() {
        assert_eq!(score("", ""), 0.0);
        assert_eq!(score("   ", "\t"), 0.0);
    }

    #[test]
    fn duplicate_tokens_collapse_to_a_set() {
        assert_eq!(score("policy policy policy", "policy"), 1.0);
    }

    #[test]
    fn casing_does_not_affect_the_score() {
        assert_eq!(score("Leave Policy", "leave policy"), 1.0);
    }

    #[test]
    fn partial_overlap_scores_intersection_over_union() {
        // {leave, policy} vs {what, is, the, leave, policy}: 2 of 5.
        let value = score("leave policy", "what is the leave policy");
        assert!((value - 0.4).abs() < 1e-9);
        assert!(value < RELEVANCE_THRESHOLD);
    }

    #[test]
    fn ranking_keeps_only_turns_at_or_above_threshold_in_score_order() {
        // Subset prefixes of a 20-token query score words/20 exactly.
        let history = vec![
            record(&query_prefix(18), "zulu"), // 0.90
            record(&query_prefix(14), "zulu"), // 0.70
            record(&query_prefix(13), "zulu"), // 0.65
            record(&query_prefix(10), "zulu"), // 0.50, dropped
            record(&query_prefix(16), "zulu"), // 0.80
            record(&query_prefix(4), "zulu"),  // 0.20, dropped
        ];

        let ranked = rank_history(QUERY, &history);

        let messages: Vec<&str> = ranked.iter().map(|r| r.user_message.as_str()).collect();
        assert_eq!(
            messages,
            vec![query_prefix(18), query_prefix(16), query_prefix(14), query_prefix(13)]
        );
    }

    #[test]
    fn ranking_uses_the_better_scoring_side_of_each_exchange() {
        let history = vec![record("unrelated words entirely", "vacation carryover rules")];
        let ranked = rank_history("vacation carryover rules", &history);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn below_threshold_overlap_is_excluded() {
        let history = vec![record("what is the leave policy", "zulu")];
        assert!(rank_history("leave policy", &history).is_empty());
    }

    #[test]
    fn ranking_caps_at_five_turns() {
        let history: Vec<ChatRecord> =
            (0..6).map(|n| record(QUERY, &format!("answer {n}"))).collect();
        let ranked = rank_history(QUERY, &history);
        assert_eq!(ranked.len(), MAX_RELEVANT_TURNS);
    }

    #[test]
    fn tied_scores_keep_chronological_order() {
        let history = vec![record(QUERY, "first answer"), record(QUERY, "second answer")];
        let ranked = rank_history(QUERY, &history);

        assert_eq!(ranked[0].bot_response, "first answer");
        assert_eq!(ranked[1].bot_response, "second answer");
    }

    #[test]
    fn empty_history_ranks_to_nothing() {
        assert!(rank_history(QUERY, &[]).is_empty());
    }
}
