//! 元素种类、名称词表与条文规则目录。目录是数据而不是代码：启动时加载一次，
//! 之后以只读引用交给规则引擎，`dump_json` 输出的正是内部使用的同一结构。

use std::collections::{BTreeMap, BTreeSet};

use plancheck_core::model::{UNLABELED, Ventilation};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalogue {
    #[serde(default = "builtin_elements")]
    pub elements: Vec<ElementSpec>,
    #[serde(default)]
    pub vocabulary: NameVocabulary,
    #[serde(default)]
    pub keywords: KeywordConfig,
    #[serde(default = "builtin_articles")]
    pub articles: Vec<ArticleSpec>,
}

impl Default for Catalogue {
    fn default() -> Self {
        Self::builtin()
    }
}

/// 一种建筑元素的最小尺寸与通风要求（第 11 条表格中的一行）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub rule_id: String,
    pub kind: String,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_area_m2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_width_m: Option<f64>,
    pub ventilation: Ventilation,
    /// 图纸中只有标注、没有几何时使用的估计尺寸。
    pub estimate: Dimensions,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub area_m2: f64,
    pub width_m: f64,
}

/// 两级名称词表：先精确匹配，再按顺序做子串匹配。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameVocabulary {
    pub exact: BTreeMap<String, String>,
    pub partial: Vec<PartialRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialRule {
    pub tokens: Vec<String>,
    pub kind: String,
}

impl Default for NameVocabulary {
    fn default() -> Self {
        builtin_vocabulary()
    }
}

/// 图层与标注中的关键字，全部为小写。
///
/// 图层选择和元素分组按子串匹配；楼层与屋面识别按整词匹配。缺省的字段取内置值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub plot_layers: Vec<String>,
    pub annotation_layers: Vec<String>,
    pub technical_layers: Vec<String>,
    pub non_building_layers: Vec<String>,
    pub ground_floor_layers: Vec<String>,
    pub floor_levels: Vec<FloorLevel>,
    /// 标注文字只有含其中一个词时才参与楼层识别，例如 `FIRST FLOOR PLAN`。
    pub floor_words: Vec<String>,
    pub roof_layers: Vec<String>,
    pub mechanical_ventilation: Vec<String>,
    pub vehicle_entrance: Vec<String>,
    pub garage_kinds: Vec<String>,
    pub parapet: Vec<String>,
    pub fence: Vec<String>,
    pub parking: Vec<String>,
    pub suite: Vec<String>,
    pub pantry: Vec<String>,
    pub hospitality_annex: Vec<String>,
    pub service_annex: Vec<String>,
    pub sports_annex: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        builtin_keywords()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorLevel {
    pub name: String,
    pub keywords: Vec<String>,
    pub position: FloorPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloorPosition {
    Basement,
    AboveGround,
    Roof,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSpec {
    pub article_id: String,
    pub title: String,
    pub rules: Vec<RuleSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub rule_id: String,
    pub description: String,
    pub kind: RuleKind,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Threshold,
    Count,
    Separation,
    Composite,
}

impl Catalogue {
    pub fn builtin() -> Self {
        Self {
            elements: builtin_elements(),
            vocabulary: builtin_vocabulary(),
            keywords: builtin_keywords(),
            articles: builtin_articles(),
        }
    }

    pub fn element(&self, kind: &str) -> Option<&ElementSpec> {
        self.elements.iter().find(|spec| spec.kind == kind)
    }

    /// 所有条文规则，按条文顺序。
    pub fn rules(&self) -> impl Iterator<Item = (&ArticleSpec, &RuleSpec)> {
        self.articles
            .iter()
            .flat_map(|article| article.rules.iter().map(move |rule| (article, rule)))
    }

    pub fn rule(&self, rule_id: &str) -> Option<&RuleSpec> {
        self.rules()
            .map(|(_, rule)| rule)
            .find(|rule| rule.rule_id == rule_id)
    }

    pub fn required_kinds(&self) -> impl Iterator<Item = &str> {
        self.elements
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.kind.as_str())
    }

    /// 合并按规则编号给出的参数覆盖。未知编号是配置错误。
    pub fn apply_overrides(
        &mut self,
        overrides: &BTreeMap<String, BTreeMap<String, f64>>,
    ) -> Result<(), ConfigError> {
        for (rule_id, params) in overrides {
            let rule = self
                .articles
                .iter_mut()
                .flat_map(|article| article.rules.iter_mut())
                .find(|rule| &rule.rule_id == rule_id)
                .ok_or_else(|| ConfigError::UnknownRule {
                    rule_id: rule_id.clone(),
                })?;
            for (name, value) in params {
                rule.params.insert(name.clone(), *value);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut rule_ids = BTreeSet::new();
        let mut kinds = BTreeSet::new();
        for spec in &self.elements {
            if !rule_ids.insert(spec.rule_id.as_str()) {
                return Err(duplicate("规则编号", &spec.rule_id));
            }
            if !kinds.insert(spec.kind.as_str()) {
                return Err(duplicate("元素种类", &spec.kind));
            }
            check_kind(&spec.kind)?;
            for (name, value) in [("min_area_m2", spec.min_area_m2), ("min_width_m", spec.min_width_m)]
            {
                if let Some(value) = value {
                    check_positive(&spec.rule_id, name, value)?;
                }
            }
            check_positive(&spec.rule_id, "estimate.area_m2", spec.estimate.area_m2)?;
            check_positive(&spec.rule_id, "estimate.width_m", spec.estimate.width_m)?;
        }

        let mut article_ids = BTreeSet::new();
        for article in &self.articles {
            if !article_ids.insert(article.article_id.as_str()) {
                return Err(duplicate("条文编号", &article.article_id));
            }
            for rule in &article.rules {
                if !rule_ids.insert(rule.rule_id.as_str()) {
                    return Err(duplicate("规则编号", &rule.rule_id));
                }
                for (name, value) in &rule.params {
                    if !value.is_finite() || *value < 0.0 {
                        return Err(ConfigError::InvalidParameter {
                            rule_id: rule.rule_id.clone(),
                            name: name.clone(),
                            value: *value,
                        });
                    }
                }
            }
        }

        for (label, kind) in &self.vocabulary.exact {
            if label.trim().is_empty() {
                return Err(ConfigError::InvalidEntry {
                    message: format!("词表中存在空标注（目标 {kind}）"),
                });
            }
            check_kind(kind)?;
        }
        for rule in &self.vocabulary.partial {
            check_kind(&rule.kind)?;
            if rule.tokens.iter().any(|token| token.trim().is_empty()) || rule.tokens.is_empty() {
                return Err(ConfigError::InvalidEntry {
                    message: format!("子串规则 {} 含空关键字", rule.kind),
                });
            }
        }
        Ok(())
    }

    /// 以 JSON 输出目录，结构与内部使用的完全一致。
    pub fn dump_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })
    }
}

fn duplicate(what: &'static str, id: &str) -> ConfigError {
    ConfigError::Duplicate {
        what,
        id: id.to_string(),
    }
}

fn check_kind(kind: &str) -> Result<(), ConfigError> {
    if kind.trim().is_empty() || kind == UNLABELED {
        return Err(ConfigError::InvalidEntry {
            message: format!("元素种类 \"{kind}\" 不可用"),
        });
    }
    Ok(())
}

fn check_positive(rule_id: &str, name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            rule_id: rule_id.to_string(),
            name: name.to_string(),
            value,
        })
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn element(
    rule_id: &str,
    kind: &str,
    description: &str,
    required: bool,
    minimum: Option<(f64, f64)>,
    ventilation: Ventilation,
    estimate: (f64, f64),
) -> ElementSpec {
    ElementSpec {
        rule_id: rule_id.to_string(),
        kind: kind.to_string(),
        description: description.to_string(),
        required,
        min_area_m2: minimum.map(|(area, _)| area),
        min_width_m: minimum.map(|(_, width)| width),
        ventilation,
        estimate: Dimensions {
            area_m2: estimate.0,
            width_m: estimate.1,
        },
    }
}

fn builtin_elements() -> Vec<ElementSpec> {
    use Ventilation::*;
    vec![
        element("11.1", "main_hall", "Main hall", true, Some((20.0, 4.0)), Natural, (20.0, 4.0)),
        element(
            "11.2",
            "master_bedroom",
            "Master bedroom",
            true,
            Some((16.0, 4.0)),
            Natural,
            (16.0, 4.0),
        ),
        element(
            "11.3",
            "additional_bedroom",
            "Additional bedroom",
            false,
            Some((14.0, 3.2)),
            Natural,
            (14.0, 3.2),
        ),
        element(
            "11.4",
            "bathroom",
            "Bathroom",
            true,
            Some((3.5, 1.6)),
            NaturalOrMechanical,
            (3.5, 1.6),
        ),
        element(
            "11.5",
            "toilet",
            "Toilet",
            false,
            Some((2.5, 1.2)),
            NaturalOrMechanical,
            (2.5, 1.2),
        ),
        element(
            "11.6",
            "kitchen",
            "Kitchen",
            true,
            Some((12.0, 3.0)),
            NaturalOrMechanical,
            (12.0, 3.0),
        ),
        element(
            "11.7",
            "living_space_bedroom",
            "Combined living space and bedroom",
            false,
            Some((9.0, 3.0)),
            Natural,
            (9.0, 3.0),
        ),
        element(
            "11.8",
            "service_space_under_4sqm",
            "Service space under 4 m²",
            false,
            None,
            NoneRequired,
            (3.0, 1.5),
        ),
        element(
            "11.9",
            "staff_bedroom",
            "Staff bedroom",
            false,
            Some((9.0, 3.0)),
            Natural,
            (9.0, 3.0),
        ),
        element(
            "11.10",
            "staff_bathroom",
            "Staff bathroom",
            false,
            Some((3.0, 1.5)),
            NaturalOrMechanical,
            (3.0, 1.5),
        ),
        element(
            "11.11",
            "garage",
            "Garage",
            false,
            Some((18.0, 3.2)),
            NoneRequired,
            (18.0, 3.2),
        ),
        element("11.12", "pool", "Swimming pool", false, None, NoneRequired, (25.0, 5.0)),
    ]
}

fn builtin_vocabulary() -> NameVocabulary {
    let groups: [(&str, &[&str]); 16] = [
        (
            "main_hall",
            &[
                "main hall",
                "hall",
                "sitting",
                "majles",
                "majlis",
                "living",
                "living room",
                "salon",
                "صالة",
                "مجلس",
            ],
        ),
        (
            "master_bedroom",
            &[
                "master bedroom",
                "bedroom master",
                "mbr",
                "master bed room",
                "غرفة نوم رئيسية",
            ],
        ),
        (
            "additional_bedroom",
            &["bedroom", "bed room", "br", "guest bedroom", "غرفة نوم"],
        ),
        ("bathroom", &["bathroom", "t&b", "washroom", "shower", "حمام"]),
        ("toilet", &["toilet", "wc", "lavatory", "دورة مياه"]),
        ("kitchen", &["kitchen", "kitch", "مطبخ"]),
        ("living_space_bedroom", &["living/bed", "studio"]),
        ("service_space_under_4sqm", &["store", "storage", "مخزن"]),
        (
            "staff_bedroom",
            &["maid room", "maid", "staff room", "driver room"],
        ),
        ("staff_bathroom", &["maid bathroom", "staff bathroom"]),
        ("garage", &["garage", "car garage", "كراج"]),
        (
            "pool",
            &["pool", "swimming pool", "swimmingpool", "حوض السباحة", "بركة", "مسبح"],
        ),
        (
            "vehicle_entrance",
            &[
                "car entrance",
                "vehicle entrance",
                "garage entrance",
                "مدخل السيارات",
                "مدخل الكراج",
            ],
        ),
        (
            "pedestrian_entrance",
            &["pedestrian entrance", "main entrance", "entrance", "مدخل", "مدخل الأفراد"],
        ),
        ("corridor", &["corridor", "passage", "hallway", "lobby", "ممر"]),
        ("annex", &["annex", "outbuilding", "ملحق"]),
    ];
    let mut exact = BTreeMap::new();
    for (kind, labels) in groups {
        for label in labels {
            exact.insert(label.to_string(), kind.to_string());
        }
    }

    // 顺序即优先级
    let partial: [(&[&str], &str); 16] = [
        (
            &[
                "car entrance",
                "car entry",
                "vehicle",
                "garage entrance",
                "مدخل السيارات",
                "مدخل الكراج",
            ],
            "vehicle_entrance",
        ),
        (&["entrance", "entry", "مدخل"], "pedestrian_entrance"),
        (&["maid bath", "staff bath", "driver bath"], "staff_bathroom"),
        (&["bath", "shower", "حمام"], "bathroom"),
        (&["wc", "toilet", "دورة مياه"], "toilet"),
        (&["master", "رئيسية"], "master_bedroom"),
        (&["maid", "staff", "driver"], "staff_bedroom"),
        (&["kitchen", "kitch", "pantry", "مطبخ"], "kitchen"),
        (&["studio"], "living_space_bedroom"),
        (&["corridor", "passage", "hallway", "ممر"], "corridor"),
        (
            &["sitting", "majles", "majlis", "salon", "hall", "living", "صالة", "مجلس"],
            "main_hall",
        ),
        (&["guest", "bed", "نوم"], "additional_bedroom"),
        (&["store", "storage", "مخزن"], "service_space_under_4sqm"),
        (&["garage", "كراج"], "garage"),
        (&["pool", "swimming", "مسبح"], "pool"),
        (&["annex", "outbuilding", "ملحق"], "annex"),
    ];
    let partial = partial
        .into_iter()
        .map(|(tokens, kind)| PartialRule {
            tokens: strings(tokens),
            kind: kind.to_string(),
        })
        .collect();

    NameVocabulary { exact, partial }
}

fn builtin_keywords() -> KeywordConfig {
    let level = |name: &str, keywords: &[&str], position| FloorLevel {
        name: name.to_string(),
        keywords: strings(keywords),
        position,
    };
    KeywordConfig {
        plot_layers: strings(&["plot", "site", "boundary", "property", "parcel", "limit"]),
        annotation_layers: strings(&[
            "title",
            "frame",
            "text",
            "dim",
            "annotation",
            "axis",
            "grid",
            "block",
        ]),
        technical_layers: strings(&[
            "duct", "mech", "elec", "door", "window", "stair", "furn", "hatch",
        ]),
        non_building_layers: strings(&["landscape", "garden", "pergola", "pool"]),
        ground_floor_layers: strings(&["ground", "grnd", "gf"]),
        floor_levels: vec![
            level("basement", &["basement", "sardab", "سرداب"], FloorPosition::Basement),
            level("ground", &["ground", "grnd", "gf"], FloorPosition::AboveGround),
            level("first", &["first", "1st", "ff"], FloorPosition::AboveGround),
            level("second", &["second", "2nd", "sf"], FloorPosition::AboveGround),
            level("roof", &["roof", "rf", "سطح"], FloorPosition::Roof),
        ],
        floor_words: strings(&["floor", "level", "plan", "storey", "story", "طابق", "دور"]),
        roof_layers: strings(&["roof", "rooftop", "surface", "terrace", "سطح"]),
        mechanical_ventilation: strings(&["mech", "forced", "exhaust"]),
        vehicle_entrance: strings(&[
            "car entrance",
            "vehicle entrance",
            "garage entrance",
            "car entry",
            "vehicle",
            "مدخل السيارات",
            "مدخل الكراج",
        ]),
        garage_kinds: strings(&["garage"]),
        parapet: strings(&["parapet", "drowa", "دروة"]),
        fence: strings(&["fence", "boundary wall", "سور"]),
        parking: strings(&["parking", "car park", "car space", "موقف", "مواقف"]),
        suite: strings(&["suite", "wing", "جناح"]),
        pantry: strings(&["pantry", "تحضيري"]),
        hospitality_annex: strings(&["hospitality", "ضيافة"]),
        service_annex: strings(&["service annex", "service block", "خدمات"]),
        sports_annex: strings(&["sports", "رياضي"]),
    }
}

fn rule(rule_id: &str, description: &str, kind: RuleKind, params: &[(&str, f64)]) -> RuleSpec {
    RuleSpec {
        rule_id: rule_id.to_string(),
        description: description.to_string(),
        kind,
        params: params
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect(),
    }
}

fn article(article_id: &str, title: &str, rules: Vec<RuleSpec>) -> ArticleSpec {
    ArticleSpec {
        article_id: article_id.to_string(),
        title: title.to_string(),
        rules,
    }
}

fn builtin_articles() -> Vec<ArticleSpec> {
    use RuleKind::*;
    vec![
        article(
            "5",
            "Building coverage",
            vec![
                rule(
                    "5.1",
                    "Building footprint must not exceed the maximum share of the plot",
                    Threshold,
                    &[("max_coverage_percent", 70.0)],
                ),
                rule(
                    "5.2",
                    "Open area must reach the minimum share of the plot",
                    Threshold,
                    &[("min_open_area_percent", 30.0)],
                ),
            ],
        ),
        article(
            "6",
            "Setbacks and projections",
            vec![
                rule(
                    "6.1",
                    "Footprint keeps the street and side setbacks",
                    Separation,
                    &[
                        ("street_setback_m", 2.0),
                        ("side_setback_m", 1.5),
                        ("tolerance_m", 0.02),
                    ],
                ),
                rule(
                    "6.2",
                    "Unlabeled built geometry lies within the plot",
                    Composite,
                    &[],
                ),
                rule(
                    "6.3",
                    "Projections beyond the plot boundary stay within the limit",
                    Threshold,
                    &[("max_projection_m", 2.0)],
                ),
            ],
        ),
        article(
            "7",
            "Annexes and corridors",
            vec![
                rule(
                    "7.1",
                    "Annexes keep the minimum separation from the main building",
                    Separation,
                    &[("min_separation_m", 1.5)],
                ),
                rule(
                    "7.2",
                    "Corridors reach the minimum clear width",
                    Threshold,
                    &[("min_width_m", 1.1)],
                ),
            ],
        ),
        article(
            "8",
            "Number of floors",
            vec![rule(
                "8.1",
                "Above-ground and basement floor counts stay within the limits",
                Count,
                &[("max_above_ground_floors", 3.0), ("max_basement_floors", 1.0)],
            )],
        ),
        article(
            "9",
            "Basement",
            vec![
                rule(
                    "9.1",
                    "At most the permitted number of basement levels",
                    Count,
                    &[("max_basements", 1.0)],
                ),
                rule(
                    "9.2",
                    "Basement outline stays within the plot boundary",
                    Composite,
                    &[("tolerance_m", 0.02)],
                ),
            ],
        ),
        article(
            "10",
            "Roof floor",
            vec![
                rule(
                    "10.1",
                    "Roof buildings cover at most the permitted share of the roof",
                    Threshold,
                    &[("max_roof_building_percent", 70.0)],
                ),
                rule(
                    "10.3",
                    "Open roof area reaches the minimum share of the roof",
                    Threshold,
                    &[("min_roof_open_percent", 30.0)],
                ),
                rule(
                    "10.4",
                    "A parapet bounds the open roof area",
                    Composite,
                    &[],
                ),
            ],
        ),
        article(
            "11",
            "Space requirements",
            vec![rule(
                "11.0",
                "Every required element kind is present",
                Composite,
                &[],
            )],
        ),
        article(
            "12",
            "Ventilation",
            vec![rule(
                "12.1",
                "Living spaces declare the required ventilation",
                Composite,
                &[],
            )],
        ),
        article(
            "14",
            "Fences",
            vec![rule(
                "14.1",
                "Boundary fences stay within the plot",
                Separation,
                &[("tolerance_m", 0.1)],
            )],
        ),
        article(
            "15",
            "Entrances",
            vec![
                rule(
                    "15.1",
                    "Number of vehicle entrances",
                    Count,
                    &[("max_count", 2.0)],
                ),
                rule(
                    "15.2",
                    "Separation between vehicle entrances",
                    Separation,
                    &[("min_separation_m", 6.0)],
                ),
                rule(
                    "15.3",
                    "Vehicle entrance width",
                    Threshold,
                    &[("min_width_m", 3.0), ("max_width_m", 6.0)],
                ),
                rule(
                    "15.4",
                    "Pedestrian entrance count and width",
                    Composite,
                    &[("max_count", 2.0), ("min_width_m", 1.0), ("max_width_m", 2.0)],
                ),
            ],
        ),
        article(
            "16",
            "Car parking",
            vec![rule(
                "16.1",
                "Minimum number of parking spaces, garages included",
                Count,
                &[("min_spaces", 2.0)],
            )],
        ),
        article(
            "18",
            "Kitchens",
            vec![
                rule(
                    "18.3",
                    "One main kitchen; additional kitchens stay specialised",
                    Count,
                    &[("main_kitchen_max", 1.0), ("specialized_kitchen_max_area_m2", 9.0)],
                ),
                rule(
                    "18.5",
                    "At most one pantry kitchen per floor, each within the area limit",
                    Composite,
                    &[("max_per_floor", 1.0), ("max_area_m2", 6.0)],
                ),
            ],
        ),
        article(
            "19",
            "Residential suites",
            vec![rule(
                "19.2",
                "Suite composition: rooms, living spaces and pantry kitchens",
                Composite,
                &[
                    ("max_rooms", 3.0),
                    ("max_living_spaces", 1.0),
                    ("max_pantry_kitchens", 1.0),
                ],
            )],
        ),
        article(
            "20",
            "Annex buildings",
            vec![
                rule(
                    "20.2",
                    "Connected annexes total at most the permitted share of the villa ground floor",
                    Threshold,
                    &[("max_percent_of_villa_ground_floor", 70.0)],
                ),
                rule(
                    "20.14",
                    "Each hospitality annex within the permitted share of the villa ground floor",
                    Threshold,
                    &[("max_percent_of_villa_ground_floor", 50.0)],
                ),
                rule(
                    "20.15",
                    "Each service annex within the permitted share of the villa ground floor",
                    Threshold,
                    &[("max_percent_of_villa_ground_floor", 50.0)],
                ),
                rule(
                    "20.16",
                    "Each sports annex within the permitted share of the villa ground floor",
                    Threshold,
                    &[("max_percent_of_villa_ground_floor", 20.0)],
                ),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtin_catalogue_validates() {
        let catalogue = Catalogue::builtin();
        catalogue.validate().expect("内置目录应通过校验");
        let required: Vec<&str> = catalogue.required_kinds().collect();
        assert_eq!(
            required,
            vec!["main_hall", "master_bedroom", "bathroom", "kitchen"]
        );
    }

    #[test]
    fn dump_round_trips_to_the_same_catalogue() {
        let catalogue = Catalogue::builtin();
        let json = catalogue.dump_json().expect("dump");
        let restored: Catalogue = serde_json::from_str(&json).expect("parse dump");
        assert_eq!(restored, catalogue);
    }

    #[test]
    fn duplicate_rule_id_is_rejected() {
        let mut catalogue = Catalogue::builtin();
        catalogue.articles[0].rules[1].rule_id = "5.1".to_string();
        assert!(matches!(
            catalogue.validate(),
            Err(ConfigError::Duplicate { ref id, .. }) if id == "5.1"
        ));
    }

    #[test]
    fn vocabulary_cannot_target_unlabeled() {
        let mut catalogue = Catalogue::builtin();
        catalogue
            .vocabulary
            .exact
            .insert("void".to_string(), UNLABELED.to_string());
        assert!(matches!(
            catalogue.validate(),
            Err(ConfigError::InvalidEntry { .. })
        ));
    }

    #[test]
    fn overrides_merge_into_existing_rule() {
        let mut catalogue = Catalogue::builtin();
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "15.3".to_string(),
            BTreeMap::from([("max_width_m".to_string(), 7.5)]),
        );
        catalogue.apply_overrides(&overrides).expect("override");
        let spec = catalogue.rule("15.3").expect("15.3");
        assert_eq!(spec.params.get("max_width_m"), Some(&7.5));
        assert_eq!(spec.params.get("min_width_m"), Some(&3.0));
    }

    #[test]
    fn articles_are_listed_in_numeric_order() {
        let catalogue = Catalogue::builtin();
        let ids: Vec<&str> = catalogue
            .articles
            .iter()
            .map(|article| article.article_id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec!["5", "6", "7", "8", "9", "10", "11", "12", "14", "15", "16", "18", "19", "20"]
        );
        assert_eq!(catalogue.rules().count(), 28);
    }

    #[test]
    fn keyword_table_without_new_lists_falls_back_to_builtin() {
        let keywords: KeywordConfig =
            toml::from_str("plot_layers = [\"lot\"]").expect("部分关键字表应当可以解析");
        assert_eq!(keywords.plot_layers, vec!["lot".to_string()]);
        assert_eq!(keywords.floor_words, builtin_keywords().floor_words);
        assert_eq!(keywords.suite, builtin_keywords().suite);
    }

    #[test]
    fn partial_entrance_rules_precede_garage() {
        let vocabulary = builtin_vocabulary();
        let entrance = vocabulary
            .partial
            .iter()
            .position(|rule| rule.kind == "vehicle_entrance")
            .expect("vehicle rule");
        let garage = vocabulary
            .partial
            .iter()
            .position(|rule| rule.kind == "garage")
            .expect("garage rule");
        assert!(entrance < garage);
    }
}
