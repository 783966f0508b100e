//! 规则共享的派生量：地块、建筑轮廓、覆盖率、退线、外凸、层数、地下室与屋面轮廓、
//! 套间归属以及元素分组。每次运行只计算一次，之后以只读引用交给所有校验器。

use std::collections::BTreeSet;

use plancheck_config::{Catalogue, FloorPosition, KeywordConfig};
use plancheck_core::{
    geometry::Point2,
    model::{Element, GeometryId, GeometryRecord, TextLabel},
    polygon,
    units::UnitContext,
};
use tracing::debug;

const PLOT_MIN_AREA_M2: f64 = 50.0;
const PLOT_MAX_AREA_M2: f64 = 50_000.0;
const PLOT_FALLBACK_MAX_AREA_M2: f64 = 100_000.0;
const FOOTPRINT_MIN_AREA_M2: f64 = 10.0;
const FOOTPRINT_MAX_AREA_M2: f64 = 10_000.0;

/// 选中的区域几何，顶点已换算为米。
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub geometry: GeometryId,
    pub layer: String,
    pub area_m2: f64,
    pub vertices: Vec<Point2>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setbacks {
    pub street_m: f64,
    /// 地块只有一条边时没有侧向退线。
    pub side_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorCount {
    pub levels: Vec<String>,
    pub above_ground: usize,
    pub basement: usize,
}

/// 屋面轮廓与其上的建筑。百分比以轮廓面积为分母。
#[derive(Debug, Clone, PartialEq)]
pub struct RoofArea {
    pub outline: Region,
    /// 屋面图层上有几何的已标注元素下标。
    pub buildings: Vec<usize>,
    pub occupied_m2: f64,
    pub open_m2: f64,
    pub coverage_percent: f64,
    pub open_percent: f64,
}

/// 套间轮廓及质心落在其中的元素。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suite {
    pub outline: usize,
    pub members: Vec<usize>,
}

/// 入口与附属元素分组，保存的是元素下标。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementGroups {
    pub vehicle_entrances: Vec<usize>,
    /// 车库类元素：从车行入口中移出，不参与间距检查。
    pub exempt_garages: Vec<usize>,
    pub pedestrian_entrances: Vec<usize>,
    pub annexes: Vec<usize>,
    pub corridors: Vec<usize>,
    pub kitchens: Vec<usize>,
    /// 标注含备餐关键字的厨房，是 `kitchens` 的子集。
    pub pantries: Vec<usize>,
    pub parapets: Vec<usize>,
    pub fences: Vec<usize>,
    pub parking: Vec<usize>,
    pub hospitality_annexes: Vec<usize>,
    pub service_annexes: Vec<usize>,
    pub sports_annexes: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregates {
    pub plot: Option<Region>,
    pub footprint: Option<Region>,
    pub coverage_percent: Option<f64>,
    pub open_area_percent: Option<f64>,
    pub setbacks: Option<Setbacks>,
    pub projection_m: Option<f64>,
    pub floors: Option<FloorCount>,
    pub basement: Option<Region>,
    pub roof: Option<RoofArea>,
    pub suites: Vec<Suite>,
    pub groups: ElementGroups,
}

impl Aggregates {
    pub fn compute(
        records: &[GeometryRecord],
        labels: &[TextLabel],
        elements: &[Element],
        catalogue: &Catalogue,
        units: &UnitContext,
    ) -> Self {
        let keywords = &catalogue.keywords;
        let groups = group_elements(elements, keywords);
        let annex_geometries: Vec<GeometryId> = groups
            .annexes
            .iter()
            .filter_map(|&index| elements[index].geometry_id())
            .collect();

        let plot = select_plot(records, keywords).map(|record| region(record, units));
        let footprint = select_footprint(records, keywords, plot.as_ref(), &annex_geometries)
            .map(|record| region(record, units));

        let (coverage_percent, open_area_percent, setbacks, projection_m) =
            match (&plot, &footprint) {
                (Some(plot), Some(footprint)) if plot.area_m2 > 0.0 => {
                    let coverage = footprint.area_m2 / plot.area_m2 * 100.0;
                    (
                        Some(coverage),
                        Some(100.0 - coverage),
                        setbacks(&plot.vertices, &footprint.vertices),
                        Some(polygon::max_projection(&plot.vertices, &footprint.vertices)),
                    )
                }
                _ => (None, None, None, None),
            };

        let floors = count_floors(records, labels, keywords);
        let basement = largest(
            records
                .iter()
                .filter(|record| record.is_region() && on_basement_layer(&record.layer, keywords)),
        )
        .map(|record| region(record, units));
        let roof = largest(
            records
                .iter()
                .filter(|record| record.is_region() && on_roof_layer(&record.layer, keywords)),
        )
        .map(|record| roof_area(region(record, units), elements, keywords));
        let suites = find_suites(elements, catalogue);
        debug!(
            plot = ?plot.as_ref().map(|p| p.geometry.0),
            footprint = ?footprint.as_ref().map(|f| f.geometry.0),
            coverage = ?coverage_percent,
            basement = basement.is_some(),
            roof = ?roof.as_ref().map(|r| r.coverage_percent),
            suites = suites.len(),
            "派生量计算完成"
        );

        Self {
            plot,
            footprint,
            coverage_percent,
            open_area_percent,
            setbacks,
            projection_m,
            floors,
            basement,
            roof,
            suites,
            groups,
        }
    }
}

fn region(record: &GeometryRecord, units: &UnitContext) -> Region {
    Region {
        geometry: record.id,
        layer: record.layer.clone(),
        area_m2: record.area_m2,
        vertices: record.vertices_m(units),
    }
}

fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|keyword| haystack.contains(keyword.as_str()))
}

/// 面积最大者胜；面积相同保留先出现的。
fn largest<'a>(candidates: impl Iterator<Item = &'a GeometryRecord>) -> Option<&'a GeometryRecord> {
    candidates.fold(None, |best: Option<&'a GeometryRecord>, record| match best {
        Some(current) if current.area_m2 >= record.area_m2 => Some(current),
        _ => Some(record),
    })
}

fn select_plot<'a>(
    records: &'a [GeometryRecord],
    keywords: &KeywordConfig,
) -> Option<&'a GeometryRecord> {
    let by_layer = largest(records.iter().filter(|record| {
        let layer = record.layer.to_lowercase();
        record.is_region()
            && contains_any(&layer, &keywords.plot_layers)
            && !contains_any(&layer, &keywords.annotation_layers)
            && (PLOT_MIN_AREA_M2..=PLOT_MAX_AREA_M2).contains(&record.area_m2)
    }));
    by_layer.or_else(|| {
        largest(records.iter().filter(|record| {
            let layer = record.layer.to_lowercase();
            record.is_region()
                && !contains_any(&layer, &keywords.technical_layers)
                && (PLOT_MIN_AREA_M2..=PLOT_FALLBACK_MAX_AREA_M2).contains(&record.area_m2)
        }))
    })
}

fn select_footprint<'a>(
    records: &'a [GeometryRecord],
    keywords: &KeywordConfig,
    plot: Option<&Region>,
    excluded: &[GeometryId],
) -> Option<&'a GeometryRecord> {
    let candidates: Vec<&GeometryRecord> = records
        .iter()
        .filter(|record| {
            let layer = record.layer.to_lowercase();
            record.is_region()
                && plot.is_none_or(|plot| {
                    record.id != plot.geometry && record.area_m2 < plot.area_m2
                })
                && !excluded.contains(&record.id)
                && !contains_any(&layer, &keywords.plot_layers)
                && !contains_any(&layer, &keywords.non_building_layers)
                && !contains_any(&layer, &keywords.annotation_layers)
                && !contains_any(&layer, &keywords.technical_layers)
                && !on_roof_layer(&record.layer, keywords)
                && !on_basement_layer(&record.layer, keywords)
                && (FOOTPRINT_MIN_AREA_M2..=FOOTPRINT_MAX_AREA_M2).contains(&record.area_m2)
        })
        .collect();

    let ground = largest(candidates.iter().copied().filter(|record| {
        contains_any(&record.layer.to_lowercase(), &keywords.ground_floor_layers)
    }));
    ground.or_else(|| largest(candidates.iter().copied()))
}

/// 街道边取地块最长边；侧向退线取其余边的最小距离。
fn setbacks(plot: &[Point2], footprint: &[Point2]) -> Option<Setbacks> {
    let (street_a, street_b) = polygon::longest_edge(plot)?;
    let street_m = polygon::segment_polygon_distance(street_a, street_b, footprint);
    let side_m = polygon::segments(plot)
        .filter(|&(a, b)| !(a == street_a && b == street_b))
        .map(|(a, b)| polygon::segment_polygon_distance(a, b, footprint))
        .fold(None, |best: Option<f64>, d| {
            Some(best.map_or(d, |b| b.min(d)))
        });
    street_m.is_finite().then_some(Setbacks { street_m, side_m })
}

/// 小写后按非字母数字切分。
fn word_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// 关键字的各个词在分词序列中连续出现。`SECOND BEDROOM` 含 `second`，但 `sec` 不算命中。
fn has_phrase(tokens: &[String], keyword: &str) -> bool {
    let wanted = word_tokens(keyword);
    !wanted.is_empty()
        && tokens
            .windows(wanted.len())
            .any(|window| window == wanted.as_slice())
}

fn has_any_phrase(tokens: &[String], keywords: &[String]) -> bool {
    keywords.iter().any(|keyword| has_phrase(tokens, keyword))
}

fn on_roof_layer(layer: &str, keywords: &KeywordConfig) -> bool {
    has_any_phrase(&word_tokens(layer), &keywords.roof_layers)
}

fn on_basement_layer(layer: &str, keywords: &KeywordConfig) -> bool {
    let tokens = word_tokens(layer);
    keywords
        .floor_levels
        .iter()
        .filter(|level| level.position == FloorPosition::Basement)
        .any(|level| has_any_phrase(&tokens, &level.keywords))
}

/// 图层名所属的楼层名称，按配置顺序取第一个命中的楼层。
pub fn level_of_layer<'a>(layer: &str, keywords: &'a KeywordConfig) -> Option<&'a str> {
    let tokens = word_tokens(layer);
    keywords
        .floor_levels
        .iter()
        .find(|level| has_any_phrase(&tokens, &level.keywords))
        .map(|level| level.name.as_str())
}

/// 图层名整词命中楼层关键字即计入；标注文字还必须含有楼层词，
/// 这样 `SECOND BEDROOM`、`FIRST AID` 之类的房间名不会被当作楼层。
fn count_floors(
    records: &[GeometryRecord],
    labels: &[TextLabel],
    keywords: &KeywordConfig,
) -> Option<FloorCount> {
    let layers: BTreeSet<&str> = records
        .iter()
        .map(|record| record.layer.as_str())
        .chain(labels.iter().map(|label| label.layer.as_str()))
        .collect();
    let texts: Vec<Vec<String>> = layers
        .into_iter()
        .map(word_tokens)
        .chain(
            labels
                .iter()
                .map(|label| word_tokens(&label.content))
                .filter(|tokens| has_any_phrase(tokens, &keywords.floor_words)),
        )
        .collect();

    let mut count = FloorCount {
        levels: Vec::new(),
        above_ground: 0,
        basement: 0,
    };
    for level in &keywords.floor_levels {
        let present = texts
            .iter()
            .any(|tokens| has_any_phrase(tokens, &level.keywords));
        if !present {
            continue;
        }
        match level.position {
            FloorPosition::Basement => count.basement += 1,
            FloorPosition::AboveGround => count.above_ground += 1,
            FloorPosition::Roof => {}
        }
        count.levels.push(level.name.clone());
    }
    (!count.levels.is_empty()).then_some(count)
}

fn roof_area(outline: Region, elements: &[Element], keywords: &KeywordConfig) -> RoofArea {
    let buildings: Vec<usize> = elements
        .iter()
        .enumerate()
        .filter(|(_, element)| {
            !element.is_unlabeled
                && element.has_geometry()
                && element.geometry_id() != Some(outline.geometry)
                && on_roof_layer(&element.layer, keywords)
        })
        .map(|(index, _)| index)
        .collect();
    let occupied_m2: f64 = buildings
        .iter()
        .filter_map(|&index| elements[index].area_m2)
        .sum();
    let open_m2 = (outline.area_m2 - occupied_m2).max(0.0);
    let (coverage_percent, open_percent) = if outline.area_m2 > 0.0 {
        (
            occupied_m2 / outline.area_m2 * 100.0,
            open_m2 / outline.area_m2 * 100.0,
        )
    } else {
        (0.0, 0.0)
    };
    RoofArea {
        outline,
        buildings,
        occupied_m2,
        open_m2,
        coverage_percent,
        open_percent,
    }
}

/// 套间轮廓：标注含套间关键字、名称不是目录种类、且带几何的元素。
/// 其余带几何的已标注元素按质心归入第一个包含它的套间。
fn find_suites(elements: &[Element], catalogue: &Catalogue) -> Vec<Suite> {
    let outlines: Vec<usize> = elements
        .iter()
        .enumerate()
        .filter(|(_, element)| {
            !element.is_unlabeled
                && element.has_geometry()
                && catalogue.element(&element.name).is_none()
                && element.label_mentions_any(&catalogue.keywords.suite)
        })
        .map(|(index, _)| index)
        .collect();
    let mut suites: Vec<Suite> = outlines
        .iter()
        .map(|&outline| Suite {
            outline,
            members: Vec::new(),
        })
        .collect();
    for (index, element) in elements.iter().enumerate() {
        if element.is_unlabeled || outlines.contains(&index) {
            continue;
        }
        let Some(center) = polygon::centroid(&element.vertices) else {
            continue;
        };
        if let Some(suite) = suites
            .iter_mut()
            .find(|suite| polygon::contains_point(&elements[suite.outline].vertices, center))
        {
            suite.members.push(index);
        }
    }
    suites
}

fn group_elements(elements: &[Element], keywords: &KeywordConfig) -> ElementGroups {
    let vehicle_keywords: Vec<&str> = keywords.vehicle_entrance.iter().map(String::as_str).collect();
    let mut groups = ElementGroups::default();
    for (index, element) in elements.iter().enumerate() {
        if element.is_unlabeled {
            continue;
        }
        let is_garage = keywords.garage_kinds.iter().any(|kind| *kind == element.name);
        if is_garage {
            // 车库先于间距检查移出车行入口组
            groups.exempt_garages.push(index);
            continue;
        }
        let name = element.name.as_str();
        if name == "vehicle_entrance" || element.mentions_any(&vehicle_keywords) {
            groups.vehicle_entrances.push(index);
        } else if name == "pedestrian_entrance" {
            groups.pedestrian_entrances.push(index);
        } else if name == "annex" {
            groups.annexes.push(index);
        } else if name == "corridor" {
            groups.corridors.push(index);
        } else if name == "kitchen" {
            groups.kitchens.push(index);
            if element.label_mentions_any(&keywords.pantry) {
                groups.pantries.push(index);
            }
        }

        let labelled = [
            (&keywords.parapet, &mut groups.parapets),
            (&keywords.fence, &mut groups.fences),
            (&keywords.parking, &mut groups.parking),
            (&keywords.hospitality_annex, &mut groups.hospitality_annexes),
            (&keywords.service_annex, &mut groups.service_annexes),
            (&keywords.sports_annex, &mut groups.sports_annexes),
        ];
        for (words, group) in labelled {
            if element.label_mentions_any(words) {
                group.push(index);
            }
        }
    }
    groups
}
