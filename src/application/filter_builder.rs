// Tag/time filter builder - where-clause fragments merged into a base query
use crate::application::template::{self, MissingParam};
use crate::domain::filter::FilterParams;
use crate::domain::query::QueryTarget;

pub const FROM_KEY: &str = "from";
pub const TO_KEY: &str = "to";

/// `'key'='v'` for one value, `'key' in ('v1','v2')` for several, nothing for none.
pub fn tag_fragment(key: &str, values: &[&str]) -> Option<String> {
    match values {
        [] => None,
        [value] => Some(format!("'{}'='{}'", key, value)),
        _ => {
            let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", v)).collect();
            Some(format!("'{}' in ({})", key, quoted.join(",")))
        }
    }
}

/// Time range fragments from the `from`/`to` parameters. `now()` expressions are kept
/// verbatim, anything else is quoted.
pub fn time_fragments(params: &FilterParams) -> Vec<String> {
    [(FROM_KEY, '>'), (TO_KEY, '<')]
        .into_iter()
        .filter_map(|(key, op)| {
            let value = params.get(key)?.joined();
            let value = value.trim();
            if value.is_empty() {
                None
            } else if value.starts_with("now()") {
                Some(format!("time{}{}", op, value))
            } else {
                Some(format!("time{}'{}'", op, value))
            }
        })
        .collect()
}

/// Tag fragments for the watched keys, in watch order, followed by the time range.
pub fn build_fragments(watch_keys: &[String], params: &FilterParams) -> Vec<String> {
    let mut fragments: Vec<String> = watch_keys
        .iter()
        .filter(|key| key.as_str() != FROM_KEY && key.as_str() != TO_KEY)
        .filter_map(|key| {
            let values = params.get(key)?.values();
            tag_fragment(key, &values)
        })
        .collect();
    fragments.extend(time_fragments(params));
    fragments
}

/// Merge fragments into a base query. Without fragments the base comes back unchanged.
pub fn merge(base: &str, fragments: &[String]) -> String {
    if fragments.is_empty() {
        return base.to_string();
    }
    ClauseModel::parse(base).render(fragments)
}

/// Final query for one target: placeholders first, then the where-clause.
pub fn build_query(target: &QueryTarget, params: &FilterParams, missing: MissingParam) -> String {
    let sql = template::render(&target.sql.to_sql(), params, missing);
    merge(&sql, &build_fragments(&target.watch_keys, params))
}

/// A query split at its `where` keyword and at the first trailing clause
/// (`group by`, `order by` or `limit <n>`). Keywords inside quotes or parentheses, in the
/// select list, or inside the `from` target (`lindb.quota.limit`) do not count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClauseModel<'a> {
    head: &'a str,
    where_keyword: Option<&'a str>,
    condition: Option<&'a str>,
    tail: Option<&'a str>,
}

impl<'a> ClauseModel<'a> {
    pub fn parse(sql: &'a str) -> Self {
        let words = top_level_words(sql);
        let target_end = from_target_end(sql, &words);
        let first_clause = words
            .iter()
            .position(|w| w.start >= target_end)
            .unwrap_or(words.len());
        let where_idx = (first_clause..words.len()).find(|&i| words[i].text == "where");
        let search_from = where_idx.map(|i| i + 1).unwrap_or(first_clause);

        let tail_start = (search_from..words.len()).find_map(|i| {
            let next = words.get(i + 1);
            let next_is_by = next.is_some_and(|w| w.text == "by");
            let next_is_count = next.is_some_and(|w| {
                w.text.bytes().all(|b| b.is_ascii_digit()) && sql[words[i].end..w.start].trim().is_empty()
            });
            match words[i].text.as_str() {
                "group" | "order" if next_is_by => Some(words[i].start),
                "limit" if next_is_count => Some(words[i].start),
                _ => None,
            }
        });
        let body_end = tail_start.unwrap_or(sql.len());

        match where_idx.map(|i| &words[i]) {
            Some(w) => ClauseModel {
                head: &sql[..w.start],
                where_keyword: Some(&sql[w.start..w.end]),
                condition: Some(&sql[w.end..body_end]),
                tail: tail_start.map(|t| &sql[t..]),
            },
            None => ClauseModel {
                head: &sql[..body_end],
                where_keyword: None,
                condition: None,
                tail: tail_start.map(|t| &sql[t..]),
            },
        }
    }

    pub fn render(&self, fragments: &[String]) -> String {
        let mut clauses: Vec<String> = fragments.to_vec();
        if let Some(existing) = self.condition.map(str::trim).filter(|c| !c.is_empty()) {
            if top_level_words(existing).iter().any(|w| w.text == "or") {
                clauses.push(format!("({})", existing));
            } else {
                clauses.push(existing.to_string());
            }
        }

        let mut out = self.head.trim_end().to_string();
        if !clauses.is_empty() {
            out.push(' ');
            out.push_str(self.where_keyword.unwrap_or("where"));
            out.push(' ');
            out.push_str(&clauses.join(" and "));
        }
        if let Some(tail) = self.tail {
            out.push(' ');
            out.push_str(tail);
        }
        out
    }
}

/// Byte offset just past the target of the first top-level `from`: the next run of
/// non-whitespace, quoted sections included. 0 when the query has no `from`.
fn from_target_end(sql: &str, words: &[Word]) -> usize {
    let Some(from) = words.iter().find(|w| w.text == "from") else {
        return 0;
    };
    let rest = &sql[from.end..];
    let target = rest.trim_start();
    let offset = from.end + (rest.len() - target.len());

    let mut quote: Option<char> = None;
    for (i, c) in target.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if matches!(c, '\'' | '"' | '`') => quote = Some(c),
            None if c.is_whitespace() => return offset + i,
            None => {}
        }
    }
    sql.len()
}

struct Word {
    start: usize,
    end: usize,
    text: String,
}

/// Lowercased words outside quotes and parentheses, with their byte spans.
fn top_level_words(sql: &str) -> Vec<Word> {
    let mut words = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut current: Option<usize> = None;

    let mut close_word = |current: &mut Option<usize>, end: usize, depth: usize| {
        if let Some(start) = current.take() {
            if depth == 0 {
                words.push(Word {
                    start,
                    end,
                    text: sql[start..end].to_ascii_lowercase(),
                });
            }
        }
    };

    for (i, c) in sql.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_ascii_alphanumeric() || c == '_' {
            if current.is_none() {
                current = Some(i);
            }
            continue;
        }
        close_word(&mut current, i, depth);
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    close_word(&mut current, sql.len(), depth);
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::QuerySource;

    fn frags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tag_fragment() {
        assert_eq!(tag_fragment("node", &[]), None);
        assert_eq!(tag_fragment("node", &["n1"]).unwrap(), "'node'='n1'");
        assert_eq!(tag_fragment("node", &["n1", "n2"]).unwrap(), "'node' in ('n1','n2')");
    }

    #[test]
    fn test_time_fragments() {
        let params = FilterParams::from_query_string("from=now()-1h&to=2024-01-01 10:00:00");
        assert_eq!(
            time_fragments(&params),
            frags(&["time>now()-1h", "time<'2024-01-01 10:00:00'"])
        );
        assert!(time_fragments(&FilterParams::new()).is_empty());
    }

    #[test]
    fn test_build_fragments_follows_watch_order() {
        let params = FilterParams::from_query_string("role=broker&node=n1&node=n2&from=now()-1h&other=x");
        let watch = vec!["node".to_string(), "role".to_string(), "from".to_string(), "missing".to_string()];

        assert_eq!(
            build_fragments(&watch, &params),
            frags(&["'node' in ('n1','n2')", "'role'='broker'", "time>now()-1h"])
        );
    }

    #[test]
    fn test_merge_without_fragments_is_identity() {
        for base in ["select cpu from t", "select cpu from t  where 'a'='b'", "select f from m group by node "] {
            assert_eq!(merge(base, &[]), base);
        }
    }

    #[test]
    fn test_merge_appends_where() {
        assert_eq!(
            merge("select cpu from t", &frags(&["'node'='n1'", "time>now()-1h"])),
            "select cpu from t where 'node'='n1' and time>now()-1h"
        );
        assert!(merge("select cpu from t  ", &frags(&["'a'='1'"])).ends_with(" where 'a'='1'"));
    }

    #[test]
    fn test_merge_inserts_before_group_by() {
        let base = "select cpu from t GROUP BY node, role";
        let merged = merge(base, &frags(&["'a'='1'"]));

        assert_eq!(merged, "select cpu from t where 'a'='1' GROUP BY node, role");
        let group_pos = merged.find("GROUP BY").unwrap();
        assert!(merged.find(" where ").unwrap() < group_pos);
        assert_eq!(&merged[group_pos..], "GROUP BY node, role");
    }

    #[test]
    fn test_merge_into_existing_where() {
        assert_eq!(
            merge("select f from m where 'role'='broker' group by node", &frags(&["'node'='n1'"])),
            "select f from m where 'node'='n1' and 'role'='broker' group by node"
        );
        assert_eq!(
            merge("select f from m Where 'a'='1' or 'a'='2'", &frags(&["time>now()-1h"])),
            "select f from m Where time>now()-1h and ('a'='1' or 'a'='2')"
        );
    }

    #[test]
    fn test_keywords_inside_quotes_ignored() {
        let base = "select f from 'where.group by' limit 10";
        let model = ClauseModel::parse(base);
        assert_eq!(model.where_keyword, None);
        assert_eq!(model.tail, Some("limit 10"));

        assert_eq!(
            merge(base, &frags(&["'a'='1'"])),
            "select f from 'where.group by' where 'a'='1' limit 10"
        );
    }

    #[test]
    fn test_limit_named_field_or_metric_is_not_a_tail() {
        assert_eq!(
            merge("select used,limit from 'mem'", &frags(&["'a'='1'"])),
            "select used,limit from 'mem' where 'a'='1'"
        );
        assert_eq!(
            merge("select used from lindb.quota.limit", &frags(&["'a'='1'"])),
            "select used from lindb.quota.limit where 'a'='1'"
        );
        assert_eq!(
            merge("select used from lindb.quota.limit group by node limit 5", &frags(&["'a'='1'"])),
            "select used from lindb.quota.limit where 'a'='1' group by node limit 5"
        );
        assert_eq!(
            merge("select limit from m where limit > 3", &frags(&["'a'='1'"])),
            "select limit from m where 'a'='1' and limit > 3"
        );
    }

    #[test]
    fn test_where_named_metric_segment_is_not_a_keyword() {
        let model = ClauseModel::parse("select f from lindb.where.group");
        assert_eq!(model.where_keyword, None);
        assert_eq!(model.tail, None);
    }

    #[test]
    fn test_build_query_renders_template_then_filters() {
        let target = QueryTarget::new(
            "_internal",
            QuerySource::raw("select {field} from 'lindb.cpu' group by node"),
            vec!["node".to_string()],
        );
        let params = FilterParams::from_query_string("field=usage&node=n1&from=now()-15m");

        assert_eq!(
            build_query(&target, &params, MissingParam::Keep),
            "select usage from 'lindb.cpu' where 'node'='n1' and time>now()-15m group by node"
        );
    }
}
