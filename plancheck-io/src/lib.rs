use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use plancheck_core::{
    geometry::Point2,
    model::{Diagnostic, LabelId, RawEntity, Stage, TextLabel},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

mod text;

pub use text::clean_text;

/// HATCH 圆弧/椭圆边折线化时每段使用的弦数。
const ARC_SEGMENTS: usize = 8;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read drawing stream: {source}")]
    StreamError {
        #[source]
        source: std::io::Error,
    },
}

/// 从文件加载图纸并完成实体提取。
pub trait DrawingLoader {
    fn load(&self, path: &Path) -> Result<Extraction, IoError>;
}

/// 提取参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractOptions {
    /// 首尾顶点距离不超过该值（原始单位）时视为闭合。
    pub closure_tolerance: f64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            closure_tolerance: 0.1,
        }
    }
}

/// 一次提取的结果：几何与标注两个有序集合，加上头部单位和诊断。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    pub insunits: Option<i32>,
    pub geometries: Vec<RawEntity>,
    pub labels: Vec<TextLabel>,
    pub diagnostics: Vec<Diagnostic>,
    /// 未建模的实体类型及数量。
    pub skipped: BTreeMap<String, usize>,
    /// 因退化（顶点不足、零长度、空文本）被丢弃的实体数量。
    pub dropped_degenerate: usize,
}

impl Extraction {
    fn push(&mut self, entity: RawEntity) {
        match entity {
            RawEntity::Text {
                layer,
                content,
                position,
            } => {
                let id = LabelId(self.labels.len());
                self.labels.push(TextLabel {
                    id,
                    content,
                    position,
                    layer,
                });
            }
            other => self.geometries.push(other),
        }
    }
}

/// 文本交换格式（组码/值成对出现）的单遍流式提取器。
#[derive(Debug, Clone, Default)]
pub struct DxfExtractor {
    options: ExtractOptions,
}

impl DxfExtractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// 从任意 `BufRead` 流中提取；只顺序读取一遍。
    pub fn extract_reader<R: BufRead>(&self, reader: R) -> Result<Extraction, IoError> {
        let parser = DxfParser::new(reader, self.options);
        parser.parse().map_err(|source| IoError::StreamError { source })
    }

    pub fn extract_str(&self, source: &str) -> Result<Extraction, IoError> {
        self.extract_reader(source.as_bytes())
    }
}

impl DrawingLoader for DxfExtractor {
    fn load(&self, path: &Path) -> Result<Extraction, IoError> {
        let file = File::open(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        self.extract_reader(BufReader::new(file))
            .map_err(|err| match err {
                IoError::StreamError { source } => IoError::ReadError {
                    path: path.to_path_buf(),
                    source,
                },
                other => other,
            })
    }
}

#[derive(Debug)]
enum DxfError {
    Invalid { message: String },
    Read(std::io::Error),
}

impl DxfError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

struct DxfParser<R> {
    reader: DxfReader<R>,
    options: ExtractOptions,
    output: Extraction,
}

impl<R: BufRead> DxfParser<R> {
    fn new(source: R, options: ExtractOptions) -> Self {
        Self {
            reader: DxfReader::new(source),
            options,
            output: Extraction::default(),
        }
    }

    fn parse(mut self) -> Result<Extraction, std::io::Error> {
        match self.parse_sections() {
            Ok(()) => {}
            Err(DxfError::Read(err)) => return Err(err),
            Err(DxfError::Invalid { message }) => self.diagnose(message),
        }
        debug!(
            geometries = self.output.geometries.len(),
            labels = self.output.labels.len(),
            diagnostics = self.output.diagnostics.len(),
            skipped = ?self.output.skipped,
            dropped = self.output.dropped_degenerate,
            "实体提取完成"
        );
        Ok(self.output)
    }

    fn diagnose(&mut self, message: impl Into<String>) {
        let message = message.into();
        let line = self.reader.line_number();
        warn!(line, message = %message, "图纸结构问题");
        self.output
            .diagnostics
            .push(Diagnostic::at_line(Stage::Extract, line, message));
    }

    /// 吸收可恢复错误；只有读流失败继续向上传递。
    fn recover(&mut self, err: DxfError) -> Result<(), DxfError> {
        match err {
            DxfError::Invalid { message } => {
                self.diagnose(message);
                Ok(())
            }
            read => Err(read),
        }
    }

    fn next_pair_tolerant(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        loop {
            match self.reader.next_pair() {
                Ok(pair) => return Ok(pair),
                Err(err) => self.recover(err)?,
            }
        }
    }

    fn parse_sections(&mut self) -> Result<(), DxfError> {
        loop {
            let Some((code, value)) = self.next_pair_tolerant()? else {
                self.diagnose("文件缺少 EOF 标记");
                return Ok(());
            };
            if code != 0 {
                continue;
            }
            match value.trim() {
                "SECTION" => {
                    let name = match self.next_pair_tolerant()? {
                        Some((2, name)) => name,
                        Some(other) => {
                            self.diagnose(format!(
                                "SECTION 名称使用了组码 {}（期望 2）",
                                other.0
                            ));
                            self.reader.put_back(other);
                            continue;
                        }
                        None => {
                            self.diagnose("SECTION 缺少名称（组码 2）");
                            return Ok(());
                        }
                    };
                    match name.trim() {
                        "HEADER" => self.parse_header()?,
                        "ENTITIES" => self.parse_entities()?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => return Ok(()),
                unexpected => {
                    self.diagnose(format!("意外的标记 {unexpected}，期望 SECTION 或 EOF"));
                }
            }
        }
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.next_pair_tolerant()? {
                Some((0, value)) if value.trim() == "ENDSEC" => return Ok(()),
                Some(_) => continue,
                None => {
                    self.diagnose("SECTION 未找到 ENDSEC 终止标记");
                    return Ok(());
                }
            }
        }
    }

    fn parse_header(&mut self) -> Result<(), DxfError> {
        loop {
            match self.next_pair_tolerant()? {
                Some((0, value)) if value.trim() == "ENDSEC" => return Ok(()),
                Some((9, name)) if name.trim() == "$INSUNITS" => match self.next_pair_tolerant()? {
                    Some((70, raw)) => match parse_i32(&raw, "$INSUNITS") {
                        Ok(code) => self.output.insunits = Some(code),
                        Err(err) => self.recover(err)?,
                    },
                    Some(other) => self.reader.put_back(other),
                    None => {
                        self.diagnose("HEADER 未找到 ENDSEC 终止标记");
                        return Ok(());
                    }
                },
                Some(_) => continue,
                None => {
                    self.diagnose("HEADER 未找到 ENDSEC 终止标记");
                    return Ok(());
                }
            }
        }
    }

    fn parse_entities(&mut self) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.next_pair_tolerant()? {
                Some(pair) => pair,
                None => {
                    self.diagnose("ENTITIES 段提前结束");
                    return Ok(());
                }
            };
            if code != 0 {
                continue;
            }

            let kind = value.trim().to_string();
            if kind == "ENDSEC" {
                return Ok(());
            }
            let start_line = self.reader.line_number();
            let parsed = match kind.as_str() {
                "LWPOLYLINE" => self.parse_lwpolyline(),
                "POLYLINE" => self.parse_polyline(),
                "LINE" => self.parse_line(),
                "HATCH" => self.parse_hatch(),
                "TEXT" | "MTEXT" => self.parse_text(&kind),
                _ => {
                    *self.output.skipped.entry(kind).or_insert(0) += 1;
                    self.skip_entity_body()?;
                    continue;
                }
            };

            match parsed {
                Ok(Some(entity)) => self.output.push(entity),
                Ok(None) => self.output.dropped_degenerate += 1,
                Err(DxfError::Invalid { message }) => {
                    let message = format!("跳过第 {start_line} 行开始的 {kind}：{message}");
                    warn!(line = start_line, entity = %kind, "跳过无法解析的实体");
                    self.output
                        .diagnostics
                        .push(Diagnostic::at_line(Stage::Extract, start_line, message));
                    self.skip_entity_body()?;
                }
                Err(read) => return Err(read),
            }
        }
    }

    fn parse_lwpolyline(&mut self) -> Result<Option<RawEntity>, DxfError> {
        let mut layer = None;
        let mut flagged_closed = false;
        let mut vertices: Vec<Point2> = Vec::new();
        let mut pending_x: Option<f64> = None;
        let mut pending_y: Option<f64> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    70 => {
                        let flag = parse_i32(&value, "LWPOLYLINE 标志")?;
                        flagged_closed = flag & 0x01 == 0x01;
                    }
                    10 => {
                        let x = parse_f64(&value, "LWPOLYLINE 顶点 X")?;
                        if let Some(y) = pending_y.take() {
                            vertices.push(Point2::new(x, y));
                        } else if pending_x.replace(x).is_some() {
                            return Err(DxfError::invalid(
                                "LWPOLYLINE 顶点缺少对应的 Y（组码 20）",
                            ));
                        }
                    }
                    20 => {
                        let y = parse_f64(&value, "LWPOLYLINE 顶点 Y")?;
                        if let Some(x) = pending_x.take() {
                            vertices.push(Point2::new(x, y));
                        } else if pending_y.replace(y).is_some() {
                            return Err(DxfError::invalid(
                                "LWPOLYLINE 顶点缺少对应的 X（组码 10）",
                            ));
                        }
                    }
                    _ => {}
                },
                None => return Err(DxfError::invalid("LWPOLYLINE 未正确结束")),
            }
        }

        if pending_x.is_some() || pending_y.is_some() {
            return Err(DxfError::invalid(
                "LWPOLYLINE 顶点坐标应成对出现（组码 10/20），检测到不完整的顶点",
            ));
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        Ok(self.finish_polyline(layer, vertices, flagged_closed))
    }

    fn parse_polyline(&mut self) -> Result<Option<RawEntity>, DxfError> {
        let mut layer = None;
        let mut flags = 0;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((8, value)) => layer = Some(value.trim().to_string()),
                Some((70, value)) => flags = parse_i32(&value, "POLYLINE 标志（组码 70）")?,
                Some(_) => {}
                None => return Err(DxfError::invalid("POLYLINE 未正确结束")),
            }
        }

        let mut vertices = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "VERTEX" => {
                    if let Some(vertex) = self.parse_vertex()? {
                        vertices.push(vertex);
                    }
                }
                Some((0, value)) if value.trim() == "SEQEND" => {
                    self.skip_entity_body()?;
                    break;
                }
                Some(other) => {
                    // 缺少 SEQEND：把下一个实体留给上层处理
                    self.reader.put_back(other);
                    break;
                }
                None => return Err(DxfError::invalid("POLYLINE 缺少 SEQEND")),
            }
        }

        // 网格与多面体不是平面区域
        if flags & (0x10 | 0x40) != 0 {
            return Ok(None);
        }
        let layer = layer.unwrap_or_else(|| "0".to_string());
        Ok(self.finish_polyline(layer, vertices, flags & 0x01 == 0x01))
    }

    fn parse_vertex(&mut self) -> Result<Option<Point2>, DxfError> {
        let mut x = None;
        let mut y = None;
        let mut flags = 0;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((10, value)) => assign_coord(&mut x, &value, "VERTEX X")?,
                Some((20, value)) => assign_coord(&mut y, &value, "VERTEX Y")?,
                Some((70, value)) => flags = parse_i32(&value, "VERTEX 标志")?,
                Some(_) => {}
                None => return Err(DxfError::invalid("VERTEX 未正确结束")),
            }
        }
        // 0x80 为多面体面记录，不携带坐标
        if flags & 0x80 != 0 && flags & 0x40 == 0 {
            return Ok(None);
        }
        match (x, y) {
            (Some(x), Some(y)) => Ok(Some(Point2::new(x, y))),
            _ => Err(DxfError::invalid("VERTEX 缺少完整的 XY 坐标")),
        }
    }

    /// 判定闭合：显式标志，或首尾顶点在容差内重合（此时去掉重复尾点）。
    fn finish_polyline(
        &self,
        layer: String,
        mut vertices: Vec<Point2>,
        flagged_closed: bool,
    ) -> Option<RawEntity> {
        if vertices.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let mut closed = flagged_closed;
        if vertices.len() >= 3 {
            if let (Some(first), Some(last)) = (vertices.first(), vertices.last()) {
                if first.distance(*last) <= self.options.closure_tolerance {
                    closed = true;
                    vertices.pop();
                }
            }
        }
        if vertices.len() < 3 {
            return None;
        }
        Some(RawEntity::Polyline {
            layer,
            vertices,
            closed,
        })
    }

    fn parse_line(&mut self) -> Result<Option<RawEntity>, DxfError> {
        let mut layer = None;
        let mut start_x = None;
        let mut start_y = None;
        let mut end_x = None;
        let mut end_y = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    10 => assign_coord(&mut start_x, &value, "LINE 起点 X")?,
                    20 => assign_coord(&mut start_y, &value, "LINE 起点 Y")?,
                    11 => assign_coord(&mut end_x, &value, "LINE 终点 X")?,
                    21 => assign_coord(&mut end_y, &value, "LINE 终点 Y")?,
                    _ => {}
                },
                None => return Err(DxfError::invalid("LINE 未正确结束")),
            }
        }

        let layer = layer.unwrap_or_else(|| "0".to_string());
        let sx = start_x.ok_or_else(|| DxfError::invalid("LINE 缺少起点 X（组码 10）"))?;
        let sy = start_y.ok_or_else(|| DxfError::invalid("LINE 缺少起点 Y（组码 20）"))?;
        let ex = end_x.ok_or_else(|| DxfError::invalid("LINE 缺少终点 X（组码 11）"))?;
        let ey = end_y.ok_or_else(|| DxfError::invalid("LINE 缺少终点 Y（组码 21）"))?;

        let start = Point2::new(sx, sy);
        let end = Point2::new(ex, ey);
        if start.distance(end) <= f64::EPSILON {
            return Ok(None);
        }
        Ok(Some(RawEntity::Line { layer, start, end }))
    }

    /// 解析 HATCH 边界。多个环路时取面积最大的外环，孔洞不参与面积计算。
    fn parse_hatch(&mut self) -> Result<Option<RawEntity>, DxfError> {
        let mut layer = None;
        let mut loops: Vec<Vec<Point2>> = Vec::new();
        let mut current: Option<HatchLoopBuilder> = None;
        let mut in_boundary = false;

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    91 => in_boundary = true,
                    92 if in_boundary => {
                        if let Some(builder) = current.take() {
                            loops.push(builder.finish()?);
                        }
                        let flags = parse_i32(&value, "HATCH 环路类型（组码 92）")?;
                        current = Some(HatchLoopBuilder::new(flags));
                    }
                    75 | 98 if in_boundary => {
                        if let Some(builder) = current.take() {
                            loops.push(builder.finish()?);
                        }
                        in_boundary = false;
                    }
                    _ => {
                        if let Some(builder) = current.as_mut() {
                            builder.accept(code, &value)?;
                        }
                    }
                },
                None => return Err(DxfError::invalid("HATCH 未正确结束")),
            }
        }
        if let Some(builder) = current.take() {
            loops.push(builder.finish()?);
        }

        let outer = loops
            .into_iter()
            .filter(|ring| ring.len() >= 3)
            .map(|ring| (plancheck_core::polygon::area(&ring), ring))
            .fold(None::<(f64, Vec<Point2>)>, |best, candidate| match best {
                Some(b) if b.0 >= candidate.0 => Some(b),
                _ => Some(candidate),
            });
        let layer = layer.unwrap_or_else(|| "0".to_string());
        Ok(outer.map(|(_, vertices)| RawEntity::Hatch { layer, vertices }))
    }

    fn parse_text(&mut self, kind: &str) -> Result<Option<RawEntity>, DxfError> {
        let is_mtext = kind == "MTEXT";
        let mut layer = None;
        let mut insert_x = None;
        let mut insert_y = None;
        let mut align_x = None;
        let mut align_y = None;
        let mut justified = false;
        let mut fragments: Vec<String> = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some((code, value)) => match code {
                    8 => layer = Some(value.trim().to_string()),
                    10 => assign_coord(&mut insert_x, &value, &format!("{kind} 插入点 X"))?,
                    20 => assign_coord(&mut insert_y, &value, &format!("{kind} 插入点 Y"))?,
                    11 if !is_mtext => align_x = Some(parse_f64(&value, "TEXT 对齐点 X")?),
                    21 if !is_mtext => align_y = Some(parse_f64(&value, "TEXT 对齐点 Y")?),
                    72 | 73 if !is_mtext => {
                        justified |= parse_i32(&value, "TEXT 对齐方式")? != 0;
                    }
                    1 | 3 => fragments.push(value),
                    _ => {}
                },
                None => return Err(DxfError::invalid(format!("{kind} 未正确结束"))),
            }
        }

        let ix = insert_x
            .ok_or_else(|| DxfError::invalid(format!("{kind} 缺少插入点 X（组码 10）")))?;
        let iy = insert_y
            .ok_or_else(|| DxfError::invalid(format!("{kind} 缺少插入点 Y（组码 20）")))?;
        // 非默认对齐的 TEXT 以对齐点为准
        let position = match (justified, align_x, align_y) {
            (true, Some(ax), Some(ay)) => Point2::new(ax, ay),
            _ => Point2::new(ix, iy),
        };

        let content = clean_text(&fragments.concat());
        if content.is_empty() {
            return Ok(None);
        }
        let layer = layer.unwrap_or_else(|| "0".to_string());
        Ok(Some(RawEntity::Text {
            layer,
            content,
            position,
        }))
    }

    /// 跳到下一个组码 0；实体内部的坏数据被吞掉，读流失败才返回错误。
    fn skip_entity_body(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair() {
                Ok(Some((0, value))) => {
                    self.reader.put_back((0, value));
                    return Ok(());
                }
                Ok(Some(_)) | Err(DxfError::Invalid { .. }) => continue,
                Ok(None) => return Ok(()),
                Err(read) => return Err(read),
            }
        }
    }
}

/// HATCH 单个边界环路的累积状态。
struct HatchLoopBuilder {
    is_polyline: bool,
    vertices: Vec<Point2>,
    pending_x: Option<f64>,
    edge: Option<EdgeBuilder>,
}

/// 边界环路中的一条边。
enum EdgeBuilder {
    Line {
        start: [Option<f64>; 2],
    },
    Arc {
        center: [Option<f64>; 2],
        radius: Option<f64>,
        start_angle: Option<f64>,
        end_angle: Option<f64>,
        counter_clockwise: bool,
    },
    Ellipse {
        center: [Option<f64>; 2],
        major: [Option<f64>; 2],
        ratio: Option<f64>,
        start_param: Option<f64>,
        end_param: Option<f64>,
        counter_clockwise: bool,
    },
    Spline {
        control: Vec<Point2>,
        pending_x: Option<f64>,
    },
}

impl HatchLoopBuilder {
    fn new(flags: i32) -> Self {
        Self {
            is_polyline: flags & 0x02 != 0,
            vertices: Vec::new(),
            pending_x: None,
            edge: None,
        }
    }

    fn accept(&mut self, code: i32, value: &str) -> Result<(), DxfError> {
        if self.is_polyline {
            match code {
                10 => {
                    if self.pending_x.replace(parse_f64(value, "HATCH 顶点 X")?).is_some() {
                        return Err(DxfError::invalid("HATCH 顶点缺少对应的 Y（组码 20）"));
                    }
                }
                20 => {
                    let y = parse_f64(value, "HATCH 顶点 Y")?;
                    let x = self
                        .pending_x
                        .take()
                        .ok_or_else(|| DxfError::invalid("HATCH 顶点缺少对应的 X（组码 10）"))?;
                    self.vertices.push(Point2::new(x, y));
                }
                _ => {}
            }
            return Ok(());
        }

        if code == 72 {
            self.flush_edge();
            self.edge = Some(EdgeBuilder::new(parse_i32(value, "HATCH 边类型（组码 72）")?)?);
            return Ok(());
        }
        match self.edge.as_mut() {
            Some(edge) => edge.accept(code, value),
            None => Ok(()),
        }
    }

    fn flush_edge(&mut self) {
        if let Some(edge) = self.edge.take() {
            self.vertices.extend(edge.into_points());
        }
    }

    fn finish(mut self) -> Result<Vec<Point2>, DxfError> {
        if self.pending_x.is_some() {
            return Err(DxfError::invalid("HATCH 顶点 X 缺少对应的 Y 坐标"));
        }
        self.flush_edge();
        let mut ring = self.vertices;
        ring.dedup_by(|a, b| a.distance(*b) <= f64::EPSILON);
        if ring.len() > 1 {
            if let (Some(first), Some(last)) = (ring.first(), ring.last()) {
                if first.distance(*last) <= f64::EPSILON {
                    ring.pop();
                }
            }
        }
        Ok(ring)
    }
}

impl EdgeBuilder {
    fn new(edge_type: i32) -> Result<Self, DxfError> {
        Ok(match edge_type {
            1 => Self::Line {
                start: [None, None],
            },
            2 => Self::Arc {
                center: [None, None],
                radius: None,
                start_angle: None,
                end_angle: None,
                counter_clockwise: true,
            },
            3 => Self::Ellipse {
                center: [None, None],
                major: [None, None],
                ratio: None,
                start_param: None,
                end_param: None,
                counter_clockwise: true,
            },
            4 => Self::Spline {
                control: Vec::new(),
                pending_x: None,
            },
            other => {
                return Err(DxfError::invalid(format!(
                    "HATCH 边类型 {other} 无法识别"
                )));
            }
        })
    }

    fn accept(&mut self, code: i32, value: &str) -> Result<(), DxfError> {
        match self {
            Self::Line { start } => match code {
                10 => start[0] = Some(parse_f64(value, "HATCH 直线边起点 X")?),
                20 => start[1] = Some(parse_f64(value, "HATCH 直线边起点 Y")?),
                _ => {}
            },
            Self::Arc {
                center,
                radius,
                start_angle,
                end_angle,
                counter_clockwise,
            } => match code {
                10 => center[0] = Some(parse_f64(value, "HATCH 圆弧圆心 X")?),
                20 => center[1] = Some(parse_f64(value, "HATCH 圆弧圆心 Y")?),
                40 => *radius = Some(parse_f64(value, "HATCH 圆弧半径")?),
                50 => *start_angle = Some(parse_f64(value, "HATCH 圆弧起始角")?),
                51 => *end_angle = Some(parse_f64(value, "HATCH 圆弧终止角")?),
                73 => *counter_clockwise = parse_i32(value, "HATCH 圆弧方向")? != 0,
                _ => {}
            },
            Self::Ellipse {
                center,
                major,
                ratio,
                start_param,
                end_param,
                counter_clockwise,
            } => match code {
                10 => center[0] = Some(parse_f64(value, "HATCH 椭圆中心 X")?),
                20 => center[1] = Some(parse_f64(value, "HATCH 椭圆中心 Y")?),
                11 => major[0] = Some(parse_f64(value, "HATCH 椭圆长轴 X")?),
                21 => major[1] = Some(parse_f64(value, "HATCH 椭圆长轴 Y")?),
                40 => *ratio = Some(parse_f64(value, "HATCH 椭圆短长轴比")?),
                50 => *start_param = Some(parse_f64(value, "HATCH 椭圆起始参数")?),
                51 => *end_param = Some(parse_f64(value, "HATCH 椭圆终止参数")?),
                73 => *counter_clockwise = parse_i32(value, "HATCH 椭圆方向")? != 0,
                _ => {}
            },
            Self::Spline { control, pending_x } => match code {
                10 => *pending_x = Some(parse_f64(value, "HATCH 样条控制点 X")?),
                20 => {
                    let y = parse_f64(value, "HATCH 样条控制点 Y")?;
                    if let Some(x) = pending_x.take() {
                        control.push(Point2::new(x, y));
                    }
                }
                _ => {}
            },
        }
        Ok(())
    }

    /// 边的折线近似，不含终点（终点即下一条边的起点）。
    fn into_points(self) -> Vec<Point2> {
        match self {
            Self::Line { start } => match start {
                [Some(x), Some(y)] => vec![Point2::new(x, y)],
                _ => Vec::new(),
            },
            Self::Arc {
                center: [Some(cx), Some(cy)],
                radius: Some(r),
                start_angle,
                end_angle,
                counter_clockwise,
            } => {
                let (start, sweep) = arc_sweep(
                    start_angle.unwrap_or(0.0).to_radians(),
                    end_angle.unwrap_or(360.0).to_radians(),
                    counter_clockwise,
                );
                (0..ARC_SEGMENTS)
                    .map(|i| {
                        let t = start + sweep * i as f64 / ARC_SEGMENTS as f64;
                        Point2::new(cx + r * t.cos(), cy + r * t.sin())
                    })
                    .collect()
            }
            Self::Ellipse {
                center: [Some(cx), Some(cy)],
                major: [Some(mx), Some(my)],
                ratio,
                start_param,
                end_param,
                counter_clockwise,
            } => {
                let ratio = ratio.unwrap_or(1.0);
                let (start, sweep) = arc_sweep(
                    start_param.unwrap_or(0.0),
                    end_param.unwrap_or(TAU),
                    counter_clockwise,
                );
                // 短轴向量为长轴逆时针旋转 90° 后按比例缩放
                let (nx, ny) = (-my * ratio, mx * ratio);
                (0..ARC_SEGMENTS)
                    .map(|i| {
                        let t = start + sweep * i as f64 / ARC_SEGMENTS as f64;
                        Point2::new(
                            cx + mx * t.cos() + nx * t.sin(),
                            cy + my * t.cos() + ny * t.sin(),
                        )
                    })
                    .collect()
            }
            Self::Spline { mut control, .. } => {
                control.pop();
                control
            }
            Self::Arc { .. } | Self::Ellipse { .. } => Vec::new(),
        }
    }
}

/// 计算起始角与带符号扫掠角。顺时针边的角度按镜像约定存储。
fn arc_sweep(start: f64, end: f64, counter_clockwise: bool) -> (f64, f64) {
    if counter_clockwise {
        let mut sweep = (end - start).rem_euclid(TAU);
        if sweep <= f64::EPSILON {
            sweep = TAU;
        }
        (start, sweep)
    } else {
        let (start, end) = (-start, -end);
        let mut sweep = (start - end).rem_euclid(TAU);
        if sweep <= f64::EPSILON {
            sweep = TAU;
        }
        (start, -sweep)
    }
}

/// 按组码/值成对读取的流式读取器，支持回退一个 pair。
struct DxfReader<R> {
    source: R,
    buffer: Option<(i32, String)>,
    line_number: usize,
    scratch: Vec<u8>,
}

impl<R: BufRead> DxfReader<R> {
    fn new(source: R) -> Self {
        Self {
            source,
            buffer: None,
            line_number: 0,
            scratch: Vec::new(),
        }
    }

    #[inline]
    fn line_number(&self) -> usize {
        self.line_number
    }

    fn read_line(&mut self) -> Result<Option<String>, DxfError> {
        self.scratch.clear();
        let read = self
            .source
            .read_until(b'\n', &mut self.scratch)
            .map_err(DxfError::Read)?;
        if read == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        let line = String::from_utf8_lossy(&self.scratch);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// 读取下一个 pair。组码行无法解析时返回可恢复错误。
    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }

        let code_line = loop {
            match self.read_line()? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
                None => return Ok(None),
            }
        };
        let Ok(code) = code_line.trim().parse::<i32>() else {
            let line = self.line_number;
            // 连同值行一起丢弃，保持组码/值的奇偶对齐
            self.read_line()?;
            return Err(DxfError::invalid(format!(
                "第 {line} 行的组码 \"{}\" 无法解析为整数",
                code_line.trim()
            )));
        };

        let value = match self.read_line()? {
            Some(line) => line,
            None => {
                return Err(DxfError::invalid(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };
        Ok(Some((code, value)))
    }

    fn put_back(&mut self, pair: (i32, String)) {
        debug_assert!(self.buffer.is_none(), "DXF pair 只能回退一次");
        self.buffer = Some(pair);
    }
}

fn assign_coord(slot: &mut Option<f64>, raw: &str, context: &str) -> Result<(), DxfError> {
    if slot.is_some() {
        return Err(DxfError::invalid(format!("{context} 出现重复值")));
    }
    *slot = Some(parse_f64(raw, context)?);
    Ok(())
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::invalid(format!("{context} 解析失败（值：\"{raw}\"）")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dxf(body: &[&str]) -> String {
        let mut out = String::new();
        for line in body {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    fn extract(source: &str) -> Extraction {
        DxfExtractor::default()
            .extract_str(source)
            .expect("内存流读取不应失败")
    }

    #[test]
    fn arc_sweep_handles_both_directions() {
        let (start, sweep) = arc_sweep(0.0, std::f64::consts::FRAC_PI_2, true);
        assert!(start.abs() < 1e-12);
        assert!((sweep - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        let (_, sweep) = arc_sweep(0.0, std::f64::consts::FRAC_PI_2, false);
        assert!(sweep < 0.0);
        let (_, full) = arc_sweep(0.0, 0.0, true);
        assert!((full - TAU).abs() < 1e-12);
    }

    #[test]
    fn closing_vertex_within_tolerance_marks_polyline_closed() {
        let source = dxf(&[
            "0", "SECTION", "2", "ENTITIES", "0", "LWPOLYLINE", "8", "ROOMS", "90", "5", "70",
            "0", "10", "0", "20", "0", "10", "4000", "20", "0", "10", "4000", "20", "3000",
            "10", "0", "20", "3000", "10", "0.05", "20", "0.02", "0", "ENDSEC", "0", "EOF",
        ]);
        let extraction = extract(&source);
        assert_eq!(extraction.geometries.len(), 1);
        match &extraction.geometries[0] {
            RawEntity::Polyline {
                vertices, closed, ..
            } => {
                assert!(*closed);
                assert_eq!(vertices.len(), 4);
            }
            other => panic!("expected polyline, got {other:?}"),
        }
    }

    #[test]
    fn bad_coordinate_skips_only_that_entity() {
        let source = dxf(&[
            "0", "SECTION", "2", "ENTITIES", "0", "LINE", "8", "A", "10", "abc", "20", "0",
            "11", "5", "21", "0", "0", "LINE", "8", "B", "10", "0", "20", "0", "11", "5", "21",
            "0", "0", "ENDSEC", "0", "EOF",
        ]);
        let extraction = extract(&source);
        assert_eq!(extraction.geometries.len(), 1);
        assert_eq!(extraction.geometries[0].layer(), "B");
        assert_eq!(extraction.diagnostics.len(), 1);
        assert_eq!(extraction.diagnostics[0].line, Some(6));
    }

    #[test]
    fn unterminated_file_keeps_collected_entities() {
        let source = dxf(&[
            "0", "SECTION", "2", "ENTITIES", "0", "LINE", "8", "WALLS", "10", "0", "20", "0",
            "11", "5", "21", "0", "0", "TEXT", "8", "TXT", "10", "1", "20", "2", "40", "2.5",
            "1", "KITCHEN",
        ]);
        let extraction = extract(&source);
        assert_eq!(extraction.geometries.len(), 1);
        assert!(extraction.labels.is_empty());
        assert!(!extraction.diagnostics.is_empty());
    }

    #[test]
    fn zero_length_line_is_dropped() {
        let source = dxf(&[
            "0", "SECTION", "2", "ENTITIES", "0", "LINE", "8", "A", "10", "1", "20", "1", "11",
            "1", "21", "1", "0", "ENDSEC", "0", "EOF",
        ]);
        let extraction = extract(&source);
        assert!(extraction.geometries.is_empty());
        assert_eq!(extraction.dropped_degenerate, 1);
        assert!(extraction.diagnostics.is_empty());
    }
}
