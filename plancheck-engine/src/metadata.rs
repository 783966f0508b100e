//! 图框中的项目信息（地块号、片区、业主、项目名）。

use once_cell::sync::Lazy;
use plancheck_core::model::TextLabel;
use regex::Regex;
use serde::Serialize;

static METADATA_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(plot|sector|owner|project)\s*(?:(?:no\b\.?|number\b|name\b|#)\s*[:.\-]?|[:\-])\s*(\S.*?)\s*$",
    )
    .expect("项目信息正则应当有效")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKey {
    Plot,
    Sector,
    Owner,
    Project,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectInfo {
    pub plot_number: Option<String>,
    pub sector: Option<String>,
    pub owner: Option<String>,
    pub project_name: Option<String>,
}

impl ProjectInfo {
    /// 每个字段取第一条匹配的标注。
    pub fn from_labels(labels: &[TextLabel]) -> Self {
        let mut info = Self::default();
        for label in labels {
            let Some((key, value)) = parse_metadata(&label.content) else {
                continue;
            };
            let slot = match key {
                MetadataKey::Plot => &mut info.plot_number,
                MetadataKey::Sector => &mut info.sector,
                MetadataKey::Owner => &mut info.owner,
                MetadataKey::Project => &mut info.project_name,
            };
            slot.get_or_insert(value);
        }
        info
    }
}

/// 解析 `KEY: value` 或 `KEY NO. value` 形式的标注。
pub fn parse_metadata(content: &str) -> Option<(MetadataKey, String)> {
    let captures = METADATA_PATTERN.captures(content)?;
    let key = match captures.get(1)?.as_str().to_ascii_lowercase().as_str() {
        "plot" => MetadataKey::Plot,
        "sector" => MetadataKey::Sector,
        "owner" => MetadataKey::Owner,
        "project" => MetadataKey::Project,
        _ => return None,
    };
    Some((key, captures.get(2)?.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use plancheck_core::{geometry::Point2, model::LabelId};

    fn label(id: usize, content: &str) -> TextLabel {
        TextLabel {
            id: LabelId(id),
            content: content.to_string(),
            position: Point2::new(0.0, 0.0),
            layer: "TITLE".to_string(),
        }
    }

    #[test]
    fn parses_key_value_forms() {
        assert_eq!(
            parse_metadata("PLOT NO: 1234"),
            Some((MetadataKey::Plot, "1234".to_string()))
        );
        assert_eq!(
            parse_metadata("plot no. 55-B"),
            Some((MetadataKey::Plot, "55-B".to_string()))
        );
        assert_eq!(
            parse_metadata("Owner: A. Khalid "),
            Some((MetadataKey::Owner, "A. Khalid".to_string()))
        );
        assert_eq!(
            parse_metadata("PROJECT NAME - VILLA"),
            Some((MetadataKey::Project, "VILLA".to_string()))
        );
    }

    #[test]
    fn room_like_text_is_not_metadata() {
        assert_eq!(parse_metadata("PLOT BOUNDARY"), None);
        assert_eq!(parse_metadata("MASTER BEDROOM"), None);
        assert_eq!(parse_metadata("PLOTTER"), None);
    }

    #[test]
    fn first_value_wins() {
        let info = ProjectInfo::from_labels(&[
            label(0, "SECTOR: 7"),
            label(1, "SECTOR: 9"),
            label(2, "PROJECT: PRIVATE VILLA"),
        ]);
        assert_eq!(info.sector.as_deref(), Some("7"));
        assert_eq!(info.project_name.as_deref(), Some("PRIVATE VILLA"));
        assert!(info.owner.is_none());
    }
}
