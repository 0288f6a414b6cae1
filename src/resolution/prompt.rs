use chrono::{DateTime, SecondsFormat, Utc};
use crate::chain::types::Market;
use crate::data::types::ExternalDataSnapshot;
use crate::resolution::types::OddsRange;

/// Deterministic for identical inputs; `now` is injected so retries and tests agree.
pub fn build_resolution_prompt(
    market: &Market,
    snapshot: &ExternalDataSnapshot,
    odds: OddsRange,
    now: DateTime<Utc>,
) -> String {
    let external_data = serde_json::to_string_pretty(snapshot)
        .unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are an oracle resolver for a prediction market. Analyze the following market and provide a resolution.

MARKET DETAILS:
Title: {title}
Description: {description}
Category: {category}
Creator: {creator:?}
Created: {created_at}
End Time: {end_time}
Current Time: {now}
Current Odds: YES {odds_yes} / NO {odds_no} basis points
Pools: YES {yes_pool} wei / NO {no_pool} wei

EXTERNAL DATA:
{external_data}

TASK:
1. Determine if the market should resolve to YES or NO
2. Provide a confidence score (0.0 to 1.0)
3. Suggest odds within the range {min_pct:.2}-{max_pct:.2} ({min}-{max} basis points)
4. Provide clear reasoning

Respond in JSON format:
{{
  "outcome": "YES" or "NO" or "UNDECIDED",
  "confidence": 0.0-1.0,
  "suggestedOddsYes": {min}-{max},
  "suggestedOddsNo": {min}-{max},
  "reasoning": "Clear explanation of your decision",
  "evidenceSources": ["list", "of", "sources"]
}}"#,
        title = market.title,
        description = market.description,
        category = market.category,
        creator = market.creator,
        created_at = market.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        odds_yes = market.odds_yes,
        odds_no = market.odds_no,
        yes_pool = market.total_yes_pool,
        no_pool = market.total_no_pool,
        end_time = market.end_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        now = now.to_rfc3339_opts(SecondsFormat::Millis, true),
        external_data = external_data,
        min = odds.min,
        max = odds.max,
        min_pct = odds.min as f64 / 10_000.0,
        max_pct = odds.max as f64 / 10_000.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_market;
    use chrono::TimeZone;

    #[test]
    fn test_prompt_embeds_market_and_evidence() {
        let market = sample_market(3, "crypto");
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let snapshot = ExternalDataSnapshot::empty(now);

        let prompt = build_resolution_prompt(&market, &snapshot, OddsRange::new(9000, 9500), now);

        assert!(prompt.contains(&format!("Title: {}", market.title)));
        assert!(prompt.contains("Category: crypto"));
        assert!(prompt.contains("Current Time: 2026-01-02T03:04:05.000Z"));
        assert!(prompt.contains("\"sources\": []"));
        assert!(prompt.contains("0.90-0.95 (9000-9500 basis points)"));
    }

    #[test]
    fn test_prompt_carries_market_book() {
        let mut market = sample_market(3, "crypto");
        market.odds_no = 800;
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let snapshot = ExternalDataSnapshot::empty(now);

        let prompt = build_resolution_prompt(&market, &snapshot, OddsRange::new(9000, 9500), now);

        assert!(prompt.contains("Creator: 0x1111111111111111111111111111111111111111"));
        assert!(prompt.contains("Created: 2025-12-01T00:00:00.000Z"));
        assert!(prompt.contains("Current Odds: YES 9200 / NO 800 basis points"));
        assert!(prompt.contains("Pools: YES 1000000000000000000 wei / NO 100000000000000000 wei"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let market = sample_market(3, "crypto");
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let snapshot = ExternalDataSnapshot::empty(now);
        let odds = OddsRange::new(9000, 9500);

        assert_eq!(
            build_resolution_prompt(&market, &snapshot, odds, now),
            build_resolution_prompt(&market, &snapshot, odds, now),
        );
    }
}
