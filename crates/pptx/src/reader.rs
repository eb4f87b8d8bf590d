//! PPTX package reader.
//!
//! Resolves slides in presentation order, collects the text and picture
//! shapes of each slide, and pulls the two things the converter needs out of
//! a melody deck: the title fields and the rendered music images.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use wide_core::{Error, ImageAsset, Metadata, Result, SourceFormat};
use zip::ZipArchive;

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";

/// Relationship type suffix for slides.
const SLIDE_REL_SUFFIX: &str = "/slide";

/// Names of the title fields in shape order.
const FIELD_NAMES: [&str; 3] = ["name", "number", "credits"];

/// Position and size of a shape in EMU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transform {
    pub x: i64,
    pub y: i64,
    pub cx: i64,
    pub cy: i64,
}

/// A top-level shape on a slide, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// A shape with a text body. Paragraphs are joined with `\n`.
    Text(String),
    /// A picture referencing a media part of the package.
    Picture { part: String, transform: Transform },
    /// Anything else (groups, connectors, tables, charts).
    Other,
}

/// The shapes of one slide.
#[derive(Debug, Clone)]
pub struct SlideContent {
    /// Part name inside the package, e.g. `ppt/slides/slide1.xml`.
    pub part: String,
    /// Top-level shapes in document order.
    pub shapes: Vec<Shape>,
}

impl SlideContent {
    /// Text of every text-bearing shape.
    pub fn texts(&self) -> Vec<&str> {
        self.shapes
            .iter()
            .filter_map(|s| match s {
                Shape::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Pictures on the slide.
    pub fn pictures(&self) -> Vec<(&str, Transform)> {
        self.shapes
            .iter()
            .filter_map(|s| match s {
                Shape::Picture { part, transform } => Some((part.as_str(), *transform)),
                _ => None,
            })
            .collect()
    }
}

/// Reader for PPTX (Office Open XML) packages.
pub struct PptxReader<R: Read + Seek> {
    archive: ZipArchive<R>,
    slide_parts: Vec<String>,
    slide_size: (i64, i64),
}

impl PptxReader<BufReader<File>> {
    /// Open a package from disk.
    ///
    /// Legacy binary decks are rejected; only the file content decides,
    /// not the extension.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut magic = [0u8; 8];
        let read = file.read(&mut magic)?;
        file.rewind()?;

        match SourceFormat::from_magic(&magic[..read]) {
            Some(SourceFormat::Pptx) => Self::new(BufReader::new(file)),
            Some(SourceFormat::Ppt) => Err(Error::UnsupportedFormat(format!(
                "{} is a binary PowerPoint 97-2003 file; save it as .pptx first",
                path.display()
            ))),
            None => Err(Error::UnsupportedFormat(format!(
                "{} is not a presentation package",
                path.display()
            ))),
        }
    }
}

impl<R: Read + Seek> PptxReader<R> {
    /// Create a reader over any seekable source.
    pub fn new(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| Error::ZipError(format!("Failed to open ZIP: {}", e)))?;

        let presentation = read_string(&mut archive, PRESENTATION_PART)?;
        let (slide_ids, slide_size) = parse_presentation(&presentation)?;

        let rels = read_string(&mut archive, PRESENTATION_RELS)?;
        let targets = parse_relationships(&rels, "ppt")?;

        let mut slide_parts = Vec::with_capacity(slide_ids.len());
        for rid in &slide_ids {
            match targets.get(rid) {
                Some(rel) if rel.rel_type.ends_with(SLIDE_REL_SUFFIX) => {
                    slide_parts.push(rel.part.clone())
                }
                _ => {
                    return Err(Error::MalformedSource(format!(
                        "Slide relationship '{}' is missing",
                        rid
                    )))
                }
            }
        }

        Ok(Self {
            archive,
            slide_parts,
            slide_size,
        })
    }

    /// Number of slides in presentation order.
    pub fn slide_count(&self) -> usize {
        self.slide_parts.len()
    }

    /// Slide canvas size `(width, height)` in EMU.
    pub fn slide_size(&self) -> (i64, i64) {
        self.slide_size
    }

    /// Parse every slide in presentation order.
    pub fn slides(&mut self) -> Result<Vec<SlideContent>> {
        let parts = self.slide_parts.clone();
        parts.iter().map(|part| self.slide(part)).collect()
    }

    /// Read the raw bytes of a package part.
    pub fn part_bytes(&mut self, part: &str) -> Result<Vec<u8>> {
        let mut file = self
            .archive
            .by_name(part)
            .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", part, e)))?;
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", part, e)))?;
        Ok(buf)
    }

    /// Read the title fields from the metadata slide.
    pub fn read_metadata(&mut self) -> Result<Metadata> {
        let slides = self.slides()?;
        let selected = metadata_slide_index(&slides)?;
        let texts = slides[selected].texts();

        if let Some(missing) = FIELD_NAMES.get(texts.len()) {
            log::debug!(
                "Slide {} has {} text shapes, need {}",
                selected + 1,
                texts.len(),
                FIELD_NAMES.len()
            );
            return Err(Error::MissingField(*missing));
        }

        Metadata::new(texts[0], texts[1], texts[2])
    }

    /// Write the picture of every slide after the metadata slide into `dir`.
    ///
    /// Files are named by their position among the image slides, starting
    /// at 1, and keep the media part's extension.
    pub fn extract_images(&mut self, dir: &Path) -> Result<Vec<ImageAsset>> {
        let slides = self.slides()?;
        let first = metadata_slide_index(&slides)?;
        std::fs::create_dir_all(dir)?;

        let mut images = Vec::new();
        for (offset, slide) in slides.iter().enumerate().skip(first + 1) {
            let index = (offset - first) as u32;
            let pictures = slide.pictures();
            let Some((part, _)) = pictures.first() else {
                return Err(Error::MalformedSource(format!(
                    "Slide {} has no picture",
                    offset + 1
                )));
            };
            if pictures.len() > 1 {
                log::warn!(
                    "Slide {} has {} pictures, using the first",
                    offset + 1,
                    pictures.len()
                );
            }

            let ext = Path::new(part)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .unwrap_or_else(|| "png".to_string());
            let bytes = self.part_bytes(part)?;
            let path = dir.join(format!("{}.{}", index, ext));
            std::fs::write(&path, bytes)?;
            images.push(ImageAsset::new(index, path));
        }

        Ok(images)
    }

    fn slide(&mut self, part: &str) -> Result<SlideContent> {
        let xml = read_string(&mut self.archive, part)?;
        let base = part_dir(part);
        let rels = match read_optional_string(&mut self.archive, &rels_part_for(part))? {
            Some(content) => parse_relationships(&content, base)?,
            None => HashMap::new(),
        };
        let shapes = parse_shapes(&xml, &rels)?;
        Ok(SlideContent {
            part: part.to_string(),
            shapes,
        })
    }
}

/// Pick the slide carrying the title fields.
///
/// The first slide is used when it has at least two text shapes, otherwise
/// the second slide.
pub fn metadata_slide_index(slides: &[SlideContent]) -> Result<usize> {
    let first = slides
        .first()
        .ok_or_else(|| Error::MalformedSource("Presentation has no slides".to_string()))?;
    if first.texts().len() >= 2 {
        return Ok(0);
    }
    if slides.len() > 1 {
        return Ok(1);
    }
    Err(Error::MalformedSource(
        "No slide carries the title fields".to_string(),
    ))
}

/// A resolved relationship.
#[derive(Debug, Clone)]
struct Relationship {
    rel_type: String,
    part: String,
}

fn read_string<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String> {
    read_optional_string(archive, path)?.ok_or_else(|| {
        Error::MalformedSource(format!("Package part '{}' is missing", path))
    })
}

fn read_optional_string<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<Option<String>> {
    let mut file = match archive.by_name(path) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(Error::ZipError(format!("Failed to open '{}': {}", path, e))),
    };

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", path, e)))?;

    Ok(Some(content))
}

/// Slide relationship ids in `p:sldIdLst` order, and the slide size.
fn parse_presentation(xml: &str) -> Result<(Vec<String>, (i64, i64))> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut ids = Vec::new();
    // 4:3 OOXML default when sldSz is absent
    let mut size = (9_144_000, 6_858_000);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"sldId" => {
                    if let Some(rid) = prefixed_attr(e, b"id") {
                        ids.push(rid);
                    }
                }
                b"sldSz" => {
                    let cx = attr_i64(e, b"cx");
                    let cy = attr_i64(e, b"cy");
                    if let (Some(cx), Some(cy)) = (cx, cy) {
                        size = (cx, cy);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!(
                    "Error parsing presentation: {}",
                    e
                )))
            }
            _ => {}
        }
    }

    Ok((ids, size))
}

/// Map relationship ids to their type and resolved part name.
fn parse_relationships(xml: &str, base_dir: &str) -> Result<HashMap<String, Relationship>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut rels = HashMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                let mut id = String::new();
                let mut rel_type = String::new();
                let mut target = String::new();
                let mut external = false;

                for attr in e.attributes().flatten() {
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    match attr.key.as_ref() {
                        b"Id" => id = value,
                        b"Type" => rel_type = value,
                        b"Target" => target = value,
                        b"TargetMode" => external = value == "External",
                        _ => {}
                    }
                }

                if !external && !id.is_empty() {
                    let part = resolve_target(base_dir, &target);
                    rels.insert(id, Relationship { rel_type, part });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!(
                    "Error parsing relationships: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(rels)
}

/// Shape currently being collected.
enum Pending {
    Text { has_body: bool, text: String, paragraphs: usize },
    Picture { embed: Option<String>, transform: Transform },
}

/// Extract top-level shapes from slide XML.
fn parse_shapes(xml: &str, rels: &HashMap<String, Relationship>) -> Result<Vec<Shape>> {
    let mut reader = Reader::from_str(xml);
    let mut shapes = Vec::new();

    let mut pending: Option<Pending> = None;
    let mut group_depth = 0usize;
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                if local == b"grpSp" {
                    group_depth += 1;
                    continue;
                }
                if group_depth > 0 {
                    continue;
                }

                match local {
                    b"sp" => {
                        pending = Some(Pending::Text {
                            has_body: false,
                            text: String::new(),
                            paragraphs: 0,
                        })
                    }
                    b"pic" => {
                        pending = Some(Pending::Picture {
                            embed: None,
                            transform: Transform::default(),
                        })
                    }
                    b"txBody" => {
                        if let Some(Pending::Text { has_body, .. }) = pending.as_mut() {
                            *has_body = true;
                        }
                    }
                    b"p" => {
                        if let Some(Pending::Text { text, paragraphs, has_body: true }) =
                            pending.as_mut()
                        {
                            if *paragraphs > 0 {
                                text.push('\n');
                            }
                            *paragraphs += 1;
                        }
                    }
                    b"t" => in_text_run = true,
                    b"br" => push_break(&mut pending),
                    _ => apply_picture_attrs(&mut pending, local, e),
                }
            }
            Ok(Event::Empty(ref e)) => {
                if group_depth > 0 {
                    continue;
                }
                let name = e.name();
                let local = local_name(name.as_ref());
                match local {
                    b"br" => push_break(&mut pending),
                    b"sp" | b"pic" | b"cxnSp" | b"graphicFrame" => shapes.push(Shape::Other),
                    _ => apply_picture_attrs(&mut pending, local, e),
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_text_run && group_depth == 0 {
                    if let Some(Pending::Text { text, .. }) = pending.as_mut() {
                        let chunk = e
                            .unescape()
                            .map_err(|e| Error::XmlError(format!("Bad slide text: {}", e)))?;
                        text.push_str(&chunk);
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                if local == b"grpSp" {
                    group_depth = group_depth.saturating_sub(1);
                    if group_depth == 0 {
                        shapes.push(Shape::Other);
                    }
                    continue;
                }
                if group_depth > 0 {
                    continue;
                }

                match local {
                    b"t" => in_text_run = false,
                    b"sp" => {
                        if let Some(Pending::Text { has_body, text, .. }) = pending.take() {
                            shapes.push(if has_body {
                                Shape::Text(text)
                            } else {
                                Shape::Other
                            });
                        }
                    }
                    b"pic" => {
                        if let Some(Pending::Picture { embed, transform }) = pending.take() {
                            let part = embed.and_then(|rid| rels.get(&rid)).map(|r| r.part.clone());
                            shapes.push(match part {
                                Some(part) => Shape::Picture { part, transform },
                                None => {
                                    log::warn!("Picture without an embedded image");
                                    Shape::Other
                                }
                            });
                        }
                    }
                    b"cxnSp" | b"graphicFrame" => shapes.push(Shape::Other),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!("Error parsing slide: {}", e)));
            }
            _ => {}
        }
    }

    Ok(shapes)
}

fn push_break(pending: &mut Option<Pending>) {
    if let Some(Pending::Text { text, .. }) = pending.as_mut() {
        text.push('\n');
    }
}

/// Record blip reference and geometry for the picture being collected.
fn apply_picture_attrs(pending: &mut Option<Pending>, local: &[u8], e: &BytesStart) {
    let Some(Pending::Picture { embed, transform }) = pending.as_mut() else {
        return;
    };
    match local {
        b"blip" => {
            if let Some(rid) = prefixed_attr(e, b"embed") {
                *embed = Some(rid);
            }
        }
        b"off" => {
            transform.x = attr_i64(e, b"x").unwrap_or(transform.x);
            transform.y = attr_i64(e, b"y").unwrap_or(transform.y);
        }
        b"ext" => {
            transform.cx = attr_i64(e, b"cx").unwrap_or(transform.cx);
            transform.cy = attr_i64(e, b"cy").unwrap_or(transform.cy);
        }
        _ => {}
    }
}

/// Value of a namespace-prefixed attribute such as `r:id` or `r:embed`.
fn prefixed_attr(e: &BytesStart, local: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        let key = attr.key.as_ref();
        let matches = key.len() > local.len()
            && key.ends_with(local)
            && key[key.len() - local.len() - 1] == b':';
        matches.then(|| String::from_utf8_lossy(&attr.value).to_string())
    })
}

fn attr_i64(e: &BytesStart, key: &[u8]) -> Option<i64> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| String::from_utf8_lossy(&attr.value).parse().ok())
}

/// Extract the local name from a potentially namespaced XML element name.
fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

/// Directory of a part name, e.g. `ppt/slides` for `ppt/slides/slide1.xml`.
fn part_dir(part: &str) -> &str {
    part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Relationship part for a part, e.g. `ppt/slides/_rels/slide1.xml.rels`.
fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
