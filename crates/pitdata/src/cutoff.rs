//! As-of cutoff rules.
//!
//! Every function here is pure: it takes rows already read from disk and keeps
//! only what was publicly known on the as-of date.
//!
//! | Data              | Kept when                                                  |
//! |-------------------|------------------------------------------------------------|
//! | Price bars        | `start <= trade_date <= as_of`                             |
//! | Statement rows    | `visibility_date <= as_of`                                 |
//! | Abstract columns  | period end and first notice both `<= as_of`                |
//! | Share facts       | latest with `effective_date <= as_of`                      |
//! | Announcements     | `start <= publish_time.date() <= as_of`, newest first      |

use std::collections::BTreeMap;

use chrono::NaiveDate;
use polars::prelude::{DataFrame, PolarsResult};
use tracing::{debug, warn};

use pitdata_cache::artifact::parse_period_column;
use pitdata_core::{Disclosure, FinancialRow, PriceBar, ShareFact};

/// Bars traded within `[start, as_of]`.
#[must_use]
pub fn filter_prices(bars: Vec<PriceBar>, start: NaiveDate, as_of: NaiveDate) -> Vec<PriceBar> {
    bars.into_iter()
        .filter(|bar| bar.trade_date >= start && bar.trade_date <= as_of)
        .collect()
}

/// Statement rows visible on `as_of`.
///
/// Rows whose disclosure date precedes their period end are logged; they stay
/// hidden until the later of the two dates.
#[must_use]
pub fn filter_statement_rows(rows: Vec<FinancialRow>, as_of: NaiveDate) -> Vec<FinancialRow> {
    rows.into_iter()
        .filter(|row| {
            if row.has_inverted_dates() {
                warn!(
                    period_end = %row.report_period_end,
                    disclosure = ?row.disclosure_date,
                    "Statement disclosed before its period ended"
                );
            }
            row.visibility_date() <= as_of
        })
        .collect()
}

/// Earliest visibility date of each reporting period.
#[must_use]
pub fn visibility_map(rows: &[FinancialRow]) -> BTreeMap<NaiveDate, NaiveDate> {
    let mut map = BTreeMap::new();
    for row in rows {
        let visible = row.visibility_date();
        map.entry(row.report_period_end)
            .and_modify(|current: &mut NaiveDate| *current = (*current).min(visible))
            .or_insert(visible);
    }
    map
}

/// Drops period columns of the wide abstract that were not public on `as_of`.
///
/// A period column is dropped when its period ends after `as_of`, or when
/// `visibility` says it was first published after `as_of`. Periods missing
/// from `visibility` are judged by their end date only. Non-period columns
/// are always kept.
///
/// # Errors
/// Propagates column selection errors from polars.
pub fn filter_abstract_columns(
    table: &DataFrame,
    visibility: &BTreeMap<NaiveDate, NaiveDate>,
    as_of: NaiveDate,
) -> PolarsResult<DataFrame> {
    let mut dropped = 0usize;
    let keep: Vec<String> = table
        .get_column_names()
        .into_iter()
        .filter(|name| match parse_period_column(name.as_str()) {
            None => true,
            Some(period) => {
                let visible = period <= as_of
                    && visibility.get(&period).is_none_or(|notice| *notice <= as_of);
                if !visible {
                    dropped += 1;
                }
                visible
            }
        })
        .map(|name| name.to_string())
        .collect();
    debug!(dropped, kept = keep.len(), "Filtered abstract columns");
    table.select(keep)
}

/// Share fact in effect on `as_of`.
#[must_use]
pub fn select_share_fact(facts: &[ShareFact], as_of: NaiveDate) -> Option<ShareFact> {
    facts
        .iter()
        .filter(|fact| fact.effective_date <= as_of)
        .max_by_key(|fact| fact.effective_date)
        .cloned()
}

/// Announcements published within `[start, as_of]`, newest first.
#[must_use]
pub fn filter_disclosures(
    items: Vec<Disclosure>,
    start: NaiveDate,
    as_of: NaiveDate,
) -> Vec<Disclosure> {
    let mut kept: Vec<Disclosure> = items
        .into_iter()
        .filter(|item| {
            let day = item.publish_time.date();
            day >= start && day <= as_of
        })
        .collect();
    kept.sort_by(|a, b| b.publish_time.cmp(&a.publish_time));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::{Column, NamedFrom};
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bar(day: NaiveDate) -> PriceBar {
        PriceBar::new(day, 1.0, 1.0, 1.0, 1.0, 1.0)
    }

    #[test]
    fn test_prices_window_is_inclusive() {
        let bars = vec![
            bar(date(2024, 1, 1)),
            bar(date(2024, 1, 2)),
            bar(date(2024, 1, 10)),
            bar(date(2024, 1, 11)),
        ];
        let kept = filter_prices(bars, date(2024, 1, 2), date(2024, 1, 10));
        let days: Vec<_> = kept.iter().map(|b| b.trade_date).collect();
        assert_eq!(days, vec![date(2024, 1, 2), date(2024, 1, 10)]);
    }

    #[test]
    fn test_statement_hidden_until_disclosed() {
        let as_of = date(2024, 4, 15);
        let row = FinancialRow::new(date(2024, 3, 31), Some(date(2024, 4, 20)));
        assert!(filter_statement_rows(vec![row.clone()], as_of).is_empty());
        assert_eq!(filter_statement_rows(vec![row], date(2024, 4, 20)).len(), 1);
    }

    #[test]
    fn test_undated_statement_visible_from_period_end() {
        let row = FinancialRow::new(date(2023, 12, 31), None);
        assert!(filter_statement_rows(vec![row.clone()], date(2023, 12, 30)).is_empty());
        assert_eq!(filter_statement_rows(vec![row], date(2023, 12, 31)).len(), 1);
    }

    #[test]
    fn test_visibility_map_takes_earliest_notice() {
        let rows = vec![
            FinancialRow::new(date(2023, 12, 31), Some(date(2024, 4, 30))),
            FinancialRow::new(date(2023, 12, 31), Some(date(2024, 3, 28))),
            FinancialRow::new(date(2024, 3, 31), None),
        ];
        let map = visibility_map(&rows);
        assert_eq!(map[&date(2023, 12, 31)], date(2024, 3, 28));
        assert_eq!(map[&date(2024, 3, 31)], date(2024, 3, 31));
    }

    #[test]
    fn test_abstract_columns_follow_notice_dates() {
        let table = DataFrame::new(vec![
            Column::new("指标".into(), vec!["净利润"]),
            Column::new("20230930".into(), vec![1.0]),
            Column::new("20231231".into(), vec![2.0]),
            Column::new("2024-03-31".into(), vec![3.0]),
        ])
        .unwrap();
        let mut visibility = BTreeMap::new();
        visibility.insert(date(2023, 9, 30), date(2023, 10, 28));
        visibility.insert(date(2023, 12, 31), date(2024, 3, 28));

        let filtered = filter_abstract_columns(&table, &visibility, date(2024, 3, 1)).unwrap();
        let names: Vec<&str> = filtered
            .get_column_names()
            .iter()
            .map(|n| n.as_str())
            .collect();
        assert_eq!(names, vec!["指标", "20230930"]);

        let later = filter_abstract_columns(&table, &visibility, date(2024, 4, 1)).unwrap();
        assert_eq!(later.width(), 4);
    }

    #[test]
    fn test_share_fact_latest_effective() {
        let fact = |y, total| ShareFact {
            effective_date: date(y, 1, 1),
            total_shares: total,
            float_shares: total,
            source_tag: "cninfo".to_string(),
        };
        let facts = vec![fact(2022, 1.0), fact(2024, 3.0), fact(2023, 2.0)];
        assert_eq!(
            select_share_fact(&facts, date(2023, 6, 1)).map(|f| f.total_shares),
            Some(2.0)
        );
        assert!(select_share_fact(&facts, date(2021, 6, 1)).is_none());
    }

    #[test]
    fn test_disclosures_window_newest_first() {
        let item = |d: NaiveDate, title: &str| Disclosure {
            publish_time: d.and_hms_opt(18, 0, 0).unwrap(),
            title: title.to_string(),
            category: None,
            url: None,
        };
        let items = vec![
            item(date(2024, 1, 5), "old"),
            item(date(2024, 3, 1), "edge"),
            item(date(2024, 2, 10), "mid"),
            item(date(2024, 3, 2), "future"),
        ];
        let kept = filter_disclosures(items, date(2024, 1, 10), date(2024, 3, 1));
        let titles: Vec<_> = kept.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["edge", "mid"]);
    }

    fn arb_date() -> impl Strategy<Value = NaiveDate> {
        (0i64..3650).prop_map(|offset| date(2015, 1, 1) + chrono::TimeDelta::days(offset))
    }

    proptest! {
        #[test]
        fn prop_no_statement_row_leaks_past_as_of(
            rows in prop::collection::vec(
                (arb_date(), prop::option::of(-60i64..200)),
                0..40,
            ),
            as_of in arb_date(),
        ) {
            let rows: Vec<FinancialRow> = rows
                .into_iter()
                .map(|(end, lag)| {
                    FinancialRow::new(end, lag.map(|days| end + chrono::TimeDelta::days(days)))
                })
                .collect();
            let expected = rows.iter().filter(|r| r.visibility_date() <= as_of).count();

            let kept = filter_statement_rows(rows, as_of);
            prop_assert_eq!(kept.len(), expected);
            for row in &kept {
                prop_assert!(row.visibility_date() <= as_of);
                prop_assert!(row.report_period_end <= as_of);
                if let Some(disclosed) = row.disclosure_date {
                    prop_assert!(disclosed <= as_of);
                }
            }
        }

        #[test]
        fn prop_price_window_bounds(
            days in prop::collection::vec(arb_date(), 0..60),
            as_of in arb_date(),
            lookback in 0i64..400,
        ) {
            let start = as_of - chrono::TimeDelta::days(lookback);
            let kept = filter_prices(days.into_iter().map(bar).collect(), start, as_of);
            for bar in &kept {
                prop_assert!(bar.trade_date >= start && bar.trade_date <= as_of);
            }
        }
    }
}
