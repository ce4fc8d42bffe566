//! Result rendering
//!
//! Turns an [`AnalysisResult`] into a [`ResultView`]: one section per present
//! analytics block, in a fixed order. Absent blocks are skipped silently; an
//! empty result yields an empty view. `Display` prints the view as a plain
//! text report.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::api::models::{AnalysisResult, ChatActivity, EmoteUsage, PastaCluster};

const MAX_NAME_CHARS: usize = 15;

/// Rendered analytics, ready for display
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultView {
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Section {
    TopChatters { rows: Vec<ChatterRow> },
    TopPastes { clusters: Vec<PastaCluster> },
    TopEmoticons { emotes: Vec<EmoteUsage> },
    ChatActivity { chart: ActivityChart },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatterRow {
    pub name: String,
    pub display_name: String,
    pub count: u64,
    pub profile_url: String,
}

/// Per-minute series aligned on one sorted minute axis
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivityChart {
    pub minutes: Vec<i64>,
    pub labels: Vec<String>,
    pub total: Vec<u64>,
    pub by_keyword: Vec<u64>,
    pub intervals: Vec<CategoryInterval>,
    /// Category label and colour, in order of first appearance
    pub legend: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryInterval {
    pub from: f64,
    pub to: f64,
    pub label: String,
    pub color: String,
}

impl ResultView {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn activity_chart(&self) -> Option<&ActivityChart> {
        self.sections.iter().find_map(|s| match s {
            Section::ChatActivity { chart } => Some(chart),
            _ => None,
        })
    }
}

/// Build the view for a result. Never fails.
pub fn render_result(result: &AnalysisResult) -> ResultView {
    let mut sections = Vec::new();

    if let Some(chatters) = &result.top_chatters {
        sections.push(Section::TopChatters {
            rows: chatters
                .iter()
                .map(|(name, count)| ChatterRow {
                    display_name: shorten_name(name),
                    profile_url: format!("https://twitch.tv/{}", name),
                    name: name.clone(),
                    count: *count,
                })
                .collect(),
        });
    }

    if let Some(pastes) = &result.top_pastes {
        sections.push(Section::TopPastes {
            clusters: pastes.clone(),
        });
    }

    if let Some(emotes) = &result.top_emoticons {
        sections.push(Section::TopEmoticons {
            emotes: emotes.clone(),
        });
    }

    if let Some(chart) = result.chat_activity.as_ref().and_then(activity_chart) {
        sections.push(Section::ChatActivity { chart });
    }

    ResultView { sections }
}

/// Chart data for chat activity; `None` without a per-minute total.
pub fn activity_chart(activity: &ChatActivity) -> Option<ActivityChart> {
    let all = activity.messages_per_minute.as_ref()?;
    let keyword = activity.keyword_messages_per_minute.clone().unwrap_or_default();

    let total_by_minute = parse_minutes(all);
    let keyword_by_minute = parse_minutes(&keyword);

    let minutes: Vec<i64> = total_by_minute
        .keys()
        .chain(keyword_by_minute.keys())
        .copied()
        .collect::<BTreeSet<i64>>()
        .into_iter()
        .collect();

    let total = minutes
        .iter()
        .map(|m| total_by_minute.get(m).copied().unwrap_or(0))
        .collect();
    let by_keyword = minutes
        .iter()
        .map(|m| keyword_by_minute.get(m).copied().unwrap_or(0))
        .collect();
    let labels = minutes.iter().map(|m| format!("{} min", m)).collect();

    let intervals: Vec<CategoryInterval> = activity
        .category_intervals
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|(from, to, label)| CategoryInterval {
            from: *from,
            to: *to,
            label: label.clone(),
            color: hash_color(label),
        })
        .collect();

    let mut legend: Vec<(String, String)> = Vec::new();
    for interval in &intervals {
        if !legend.iter().any(|(label, _)| label == &interval.label) {
            legend.push((interval.label.clone(), interval.color.clone()));
        }
    }

    Some(ActivityChart {
        minutes,
        labels,
        total,
        by_keyword,
        intervals,
        legend,
    })
}

/// Counts keyed by parsed minute. Keys that land on the same minute
/// ("3" and "3.0") are summed.
fn parse_minutes<'a>(
    series: impl IntoIterator<Item = (&'a String, &'a u64)>,
) -> BTreeMap<i64, u64> {
    let mut by_minute = BTreeMap::new();
    for (key, count) in series {
        match parse_minute(key) {
            Some(minute) => *by_minute.entry(minute).or_insert(0) += *count,
            None => debug!("Skipping non-numeric minute key {:?}", key),
        }
    }
    by_minute
}

/// Minute keys are integers, but float offsets ("3.0") show up too.
fn parse_minute(key: &str) -> Option<i64> {
    let key = key.trim();
    key.parse::<i64>().ok().or_else(|| {
        key.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.trunc() as i64)
    })
}

fn shorten_name(name: &str) -> String {
    if name.chars().count() > MAX_NAME_CHARS {
        let short: String = name.chars().take(MAX_NAME_CHARS).collect();
        format!("{}...", short)
    } else {
        name.to_string()
    }
}

/// Stable colour for a category label (31-multiplier string hash over UTF-16
/// units, low three bytes as r, g, b).
pub fn hash_color(label: &str) -> String {
    let hash = label
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            (unit as i32).wrapping_add((hash << 5).wrapping_sub(hash))
        });
    let r = hash & 255;
    let g = (hash >> 8) & 255;
    let b = (hash >> 16) & 255;
    format!("rgba({}, {}, {}, 0.5)", r, g, b)
}

impl ActivityChart {
    /// First category interval covering `minute`
    pub fn category_at(&self, minute: i64) -> Option<&str> {
        let minute = minute as f64;
        self.intervals
            .iter()
            .find(|i| i.from <= minute && minute <= i.to)
            .map(|i| i.label.as_str())
    }
}

impl fmt::Display for ResultView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", section)?;
        }
        Ok(())
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::TopChatters { rows } => {
                writeln!(f, "Top chatters")?;
                for (rank, row) in rows.iter().enumerate() {
                    writeln!(
                        f,
                        "  {:>2}. {:<18} {:>6} msgs  {}",
                        rank + 1,
                        row.display_name,
                        row.count,
                        row.profile_url
                    )?;
                }
            }
            Section::TopPastes { clusters } => {
                writeln!(f, "Top pastes")?;
                for cluster in clusters {
                    writeln!(f, "  ({}) {}", cluster.count, cluster.base_pasta)?;
                    for variant in &cluster.variants {
                        writeln!(f, "      ({}) {}", variant.count, variant.text)?;
                    }
                }
            }
            Section::TopEmoticons { emotes } => {
                writeln!(f, "Top emoticons")?;
                for emote in emotes {
                    writeln!(f, "  {:<20} {:>6}  {}", emote.name, emote.count, emote.url)?;
                }
            }
            Section::ChatActivity { chart } => {
                writeln!(f, "Chat activity per minute")?;
                writeln!(f, "  {:>8}  {:>6}  {:>8}  category", "minute", "total", "keywords")?;
                for (i, minute) in chart.minutes.iter().enumerate() {
                    writeln!(
                        f,
                        "  {:>8}  {:>6}  {:>8}  {}",
                        chart.labels[i],
                        chart.total[i],
                        chart.by_keyword[i],
                        chart.category_at(*minute).unwrap_or("")
                    )?;
                }
                if !chart.legend.is_empty() {
                    writeln!(f, "Categories:")?;
                    for (label, color) in &chart.legend {
                        writeln!(f, "  {}  {}", label, color)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::PastaVariant;

    fn minutes(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_empty_result_renders_nothing() {
        let view = render_result(&AnalysisResult::default());
        assert!(view.is_empty());
        assert_eq!(view.to_string(), "");
    }

    #[test]
    fn test_total_series_follows_sorted_minutes() {
        let result = AnalysisResult {
            chat_activity: Some(ChatActivity {
                messages_per_minute: Some(minutes(&[("0", 5), ("1", 3)])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let view = render_result(&result);
        let chart = view.activity_chart().unwrap();
        assert_eq!(chart.minutes, vec![0, 1]);
        assert_eq!(chart.total, vec![5, 3]);
        assert_eq!(chart.by_keyword, vec![0, 0]);
        assert_eq!(chart.labels, vec!["0 min", "1 min"]);
    }

    #[test]
    fn test_minutes_sort_numerically_and_merge_keyword_series() {
        let activity = ChatActivity {
            messages_per_minute: Some(minutes(&[("10", 4), ("2", 7), ("9", 1)])),
            keyword_messages_per_minute: Some(minutes(&[("2", 1), ("11", 2)])),
            category_intervals: None,
        };

        let chart = activity_chart(&activity).unwrap();
        assert_eq!(chart.minutes, vec![2, 9, 10, 11]);
        assert_eq!(chart.total, vec![7, 1, 4, 0]);
        assert_eq!(chart.by_keyword, vec![1, 0, 0, 2]);
    }

    #[test]
    fn test_float_and_garbage_minute_keys() {
        let activity = ChatActivity {
            messages_per_minute: Some(minutes(&[("3.0", 2), ("oops", 9), ("1", 1)])),
            ..Default::default()
        };
        let chart = activity_chart(&activity).unwrap();
        assert_eq!(chart.minutes, vec![1, 3]);
        assert_eq!(chart.total, vec![1, 2]);
    }

    #[test]
    fn test_keys_on_the_same_minute_are_summed() {
        let activity = ChatActivity {
            messages_per_minute: Some(minutes(&[("3", 2), ("3.0", 4), ("3.9", 1), ("4", 5)])),
            keyword_messages_per_minute: Some(minutes(&[("4.5", 1), ("4", 1)])),
            category_intervals: None,
        };
        let chart = activity_chart(&activity).unwrap();
        assert_eq!(chart.minutes, vec![3, 4]);
        assert_eq!(chart.total, vec![7, 5]);
        assert_eq!(chart.by_keyword, vec![0, 2]);
    }

    #[test]
    fn test_activity_needs_total_series() {
        let activity = ChatActivity {
            keyword_messages_per_minute: Some(minutes(&[("1", 1)])),
            ..Default::default()
        };
        assert!(activity_chart(&activity).is_none());

        let result = AnalysisResult {
            chat_activity: Some(activity),
            ..Default::default()
        };
        assert!(render_result(&result).is_empty());
    }

    #[test]
    fn test_hash_color_is_stable() {
        assert_eq!(hash_color("a"), "rgba(97, 0, 0, 0.5)");
        assert_eq!(hash_color("ab"), "rgba(33, 12, 0, 0.5)");
        assert_eq!(hash_color(""), "rgba(0, 0, 0, 0.5)");
        assert_eq!(hash_color("Just Chatting"), hash_color("Just Chatting"));
    }

    #[test]
    fn test_category_legend_dedupes_in_order() {
        let activity = ChatActivity {
            messages_per_minute: Some(minutes(&[("0", 1), ("45", 1)])),
            keyword_messages_per_minute: None,
            category_intervals: Some(vec![
                (0.0, 30.0, "Just Chatting".to_string()),
                (30.0, 90.0, "Elden Ring".to_string()),
                (90.0, 120.0, "Just Chatting".to_string()),
            ]),
        };
        let chart = activity_chart(&activity).unwrap();
        let labels: Vec<&str> = chart.legend.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["Just Chatting", "Elden Ring"]);
        assert_eq!(chart.category_at(45), Some("Elden Ring"));
        assert_eq!(chart.category_at(500), None);
    }

    #[test]
    fn test_sections_render_independently() {
        let result = AnalysisResult {
            top_chatters: Some(vec![("averyveryverylongname".to_string(), 40)]),
            top_pastes: Some(vec![PastaCluster {
                base_pasta: "KEKW".to_string(),
                count: 4,
                variants: vec![PastaVariant {
                    text: "KEKW KEKW".to_string(),
                    count: 2,
                }],
            }]),
            ..Default::default()
        };

        let view = render_result(&result);
        assert_eq!(view.sections.len(), 2);
        match &view.sections[0] {
            Section::TopChatters { rows } => {
                assert_eq!(rows[0].display_name, "averyveryverylo...");
                assert_eq!(rows[0].profile_url, "https://twitch.tv/averyveryverylongname");
            }
            other => panic!("unexpected section {:?}", other),
        }

        let text = view.to_string();
        assert!(text.contains("Top pastes"));
        assert!(text.contains("      (2) KEKW KEKW"));
        assert!(!text.contains("Top emoticons"));
    }
}
