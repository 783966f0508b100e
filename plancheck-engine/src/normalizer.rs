//! 名称归一化：先查精确词表，未命中再按顺序尝试子串规则（先命中者胜）。
//! 两级都未命中时原样返回标注文字，由规则引擎决定该名称是否可识别。

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use plancheck_config::NameVocabulary;
use plancheck_core::model::UNLABELED;
use regex::Regex;
use serde::Serialize;

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").expect("括注正则应当有效"));
static DIMENSIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+(?:\.\d+)?\s*[x×*]\s*\d+(?:\.\d+)?").expect("尺寸正则应当有效")
});
static TRAILING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\-_#.:]*\d+$").expect("编号正则应当有效"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Exact,
    Partial,
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub name: String,
    pub matched_by: MatchedBy,
}

impl Normalized {
    #[inline]
    pub fn is_recognized(&self) -> bool {
        self.matched_by != MatchedBy::Unmatched
    }
}

#[derive(Debug, Clone)]
pub struct NameNormalizer {
    exact: BTreeMap<String, String>,
    partial: Vec<(Vec<String>, String)>,
}

impl NameNormalizer {
    /// 词表的键与关键字按标注同样的规则折叠，保证两侧可比。
    pub fn new(vocabulary: &NameVocabulary) -> Self {
        let exact = vocabulary
            .exact
            .iter()
            .map(|(label, kind)| (lookup_key(label), kind.clone()))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        let partial = vocabulary
            .partial
            .iter()
            .map(|rule| {
                let tokens = rule
                    .tokens
                    .iter()
                    .map(|token| fold(token))
                    .filter(|token| !token.is_empty())
                    .collect();
                (tokens, rule.kind.clone())
            })
            .collect();
        Self { exact, partial }
    }

    pub fn normalize(&self, label: &str) -> Normalized {
        let key = lookup_key(label);
        if let Some(kind) = self.exact.get(&key) {
            return Normalized {
                name: kind.clone(),
                matched_by: MatchedBy::Exact,
            };
        }

        let haystack = fold(label);
        for (tokens, kind) in &self.partial {
            if tokens.iter().any(|token| haystack.contains(token.as_str())) {
                return Normalized {
                    name: kind.clone(),
                    matched_by: MatchedBy::Partial,
                };
            }
        }

        // 保留名只属于无标注几何
        let raw = label.trim();
        let name = if raw == UNLABELED {
            format!("{raw} (label)")
        } else {
            raw.to_string()
        };
        Normalized {
            name,
            matched_by: MatchedBy::Unmatched,
        }
    }
}

/// 小写、统一阿拉伯字母变体、合并空白。
fn fold(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .filter(|ch| *ch != '\u{0640}')
        .map(|ch| match ch {
            '\u{0623}' | '\u{0625}' | '\u{0622}' => '\u{0627}',
            '\u{0649}' => '\u{064A}',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 精确查表使用的键：去掉括注、尺寸标注和末尾的编号。
pub fn lookup_key(label: &str) -> String {
    let folded = fold(label);
    let stripped = BRACKETED.replace_all(&folded, " ");
    let stripped = DIMENSIONS.replace_all(&stripped, " ");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    TRAILING_NUMBER
        .replace(&collapsed, "")
        .trim_matches(|ch: char| ch.is_whitespace() || matches!(ch, ':' | '-' | '.'))
        .to_string()
}
