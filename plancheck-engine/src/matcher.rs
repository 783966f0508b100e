//! 标注与几何的关联。每个标注选择距离最近的合格闭合几何；每个几何最多接收一个标注，
//! 先到者胜，后来者记录诊断后丢弃。

use std::collections::BTreeMap;

use plancheck_config::PipelineConfig;
use plancheck_core::{
    model::{Diagnostic, GeometryId, GeometryRecord, LabelId, Stage, TextLabel},
    polygon,
};
use tracing::debug;

use crate::metadata::parse_metadata;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelMatches {
    pub by_geometry: BTreeMap<GeometryId, LabelId>,
    /// 没有任何合格几何的标注。
    pub unmatched: Vec<LabelId>,
    /// 目标几何已被占用而丢弃的标注。
    pub discarded: Vec<LabelId>,
    /// 纯数字、符号或项目信息等不参与匹配的标注。
    pub ignored: Vec<LabelId>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LabelMatches {
    pub fn label_for(&self, geometry: GeometryId) -> Option<LabelId> {
        self.by_geometry.get(&geometry).copied()
    }
}

/// 标注是否可能是房间名：至少含一个字母，且不是项目信息。
pub fn is_room_label(content: &str) -> bool {
    content.chars().any(char::is_alphabetic) && parse_metadata(content).is_none()
}

pub fn match_labels(
    records: &[GeometryRecord],
    labels: &[TextLabel],
    config: &PipelineConfig,
) -> LabelMatches {
    let mut matches = LabelMatches::default();
    let candidates: Vec<&GeometryRecord> =
        records.iter().filter(|record| record.is_region()).collect();

    for label in labels {
        if !is_room_label(&label.content) {
            matches.ignored.push(label.id);
            continue;
        }
        let Some(target) = nearest_geometry(&candidates, label, config) else {
            matches.unmatched.push(label.id);
            continue;
        };

        if let Some(owner) = matches.label_for(target) {
            let owner_text = labels
                .iter()
                .find(|l| l.id == owner)
                .map(|l| l.content.as_str())
                .unwrap_or_default();
            matches.diagnostics.push(Diagnostic::new(
                Stage::Match,
                format!(
                    "标注 \"{}\" 指向的几何 #{} 已由 \"{}\" 标注，已丢弃",
                    label.content, target.0, owner_text
                ),
            ));
            matches.discarded.push(label.id);
            continue;
        }
        matches.by_geometry.insert(target, label.id);
    }

    debug!(
        matched = matches.by_geometry.len(),
        unmatched = matches.unmatched.len(),
        discarded = matches.discarded.len(),
        "标注匹配完成"
    );
    matches
}

/// 合格条件：标注点落在几何内，或与质心的距离不超过 `match_scale` 倍半对角线。
/// 距离相同（相对容差内）时优先同图层，其次编号较小者。
fn nearest_geometry(
    candidates: &[&GeometryRecord],
    label: &TextLabel,
    config: &PipelineConfig,
) -> Option<GeometryId> {
    let mut best: Option<(f64, bool, GeometryId)> = None;
    for record in candidates {
        let distance = record.centroid.distance(label.position);
        let radius = config.match_scale * record.bounds.diagonal() * 0.5;
        let inside = polygon::contains_point(&record.vertices, label.position);
        if !inside && distance > radius {
            continue;
        }
        let same_layer = record.layer == label.layer;
        best = match best {
            None => Some((distance, same_layer, record.id)),
            Some((best_distance, best_same_layer, best_id)) => {
                let tolerance = config.tie_tolerance * best_distance.max(distance).max(1.0);
                if (distance - best_distance).abs() <= tolerance {
                    if same_layer && !best_same_layer {
                        Some((distance, same_layer, record.id))
                    } else {
                        Some((best_distance, best_same_layer, best_id))
                    }
                } else if distance < best_distance {
                    Some((distance, same_layer, record.id))
                } else {
                    Some((best_distance, best_same_layer, best_id))
                }
            }
        };
    }
    best.map(|(_, _, id)| id)
}
