//! Wide presentation writer.
//!
//! Builds a complete PPTX package: a title slide generated from the deck's
//! metadata, then one full-width, vertically centered picture per slide.

use crate::template::{self, uri, NS_A, NS_P, NS_R, SP_TREE_HEADER, XML_DECL};
use quick_xml::escape::escape;
use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::path::Path;
use wide_core::{Error, ImageAsset, Metadata, Result};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// 16:9 canvas width in EMU (13.333 in).
pub const WIDE_WIDTH: i64 = 12_192_000;
/// 16:9 canvas height in EMU (7.5 in).
pub const WIDE_HEIGHT: i64 = 6_858_000;

/// First slide id PowerPoint hands out.
const FIRST_SLIDE_ID: usize = 256;

/// Character styling for one title field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStyle {
    /// Font size in points.
    pub size_pt: u32,
    pub bold: bool,
    pub italic: bool,
    /// Let the viewer shrink text that overflows the box.
    pub shrink_to_fit: bool,
}

/// A text box on the title slide, in EMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextBox {
    pub x: i64,
    pub y: i64,
    pub cx: i64,
    pub cy: i64,
    pub style: TextStyle,
}

/// Geometry and styling of the generated title slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleLayout {
    pub name: TextBox,
    pub number: TextBox,
    pub credits: TextBox,
    pub typeface: String,
}

impl Default for TitleLayout {
    fn default() -> Self {
        Self {
            name: TextBox {
                x: 914_400,
                y: 2_130_426,
                cx: 10_363_200,
                cy: 1_470_525,
                style: TextStyle {
                    size_pt: 60,
                    bold: true,
                    italic: false,
                    shrink_to_fit: true,
                },
            },
            number: TextBox {
                x: 2_341_418,
                y: 6_928,
                cx: 7_772_400,
                cy: 735_013,
                style: TextStyle {
                    size_pt: 30,
                    bold: false,
                    italic: true,
                    shrink_to_fit: false,
                },
            },
            credits: TextBox {
                x: 1_513_609,
                y: 5_688_449,
                cx: 9_164_782,
                cy: 1_169_551,
                style: TextStyle {
                    size_pt: 14,
                    bold: false,
                    italic: true,
                    shrink_to_fit: true,
                },
            },
            typeface: "Calibri".to_string(),
        }
    }
}

/// Where a picture lands on the canvas, in EMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
    pub cx: i64,
    pub cy: i64,
}

/// Scale an image of `px_width` x `px_height` to the canvas width and center
/// it vertically. Halves round to even.
pub fn place_image(canvas_width: i64, canvas_height: i64, px_width: u32, px_height: u32) -> Placement {
    let cy = (canvas_width as f64 * px_height as f64 / px_width.max(1) as f64).round_ties_even() as i64;
    let y = ((canvas_height - cy) as f64 / 2.0).round_ties_even() as i64;
    Placement {
        x: 0,
        y,
        cx: canvas_width,
        cy,
    }
}

/// Builder for wide presentations.
#[derive(Debug, Clone)]
pub struct PresentationBuilder {
    width: i64,
    height: i64,
    layout: TitleLayout,
}

impl Default for PresentationBuilder {
    fn default() -> Self {
        Self {
            width: WIDE_WIDTH,
            height: WIDE_HEIGHT,
            layout: TitleLayout::default(),
        }
    }
}

/// A picture slide ready to serialize.
struct PictureSlide {
    media_part: String,
    placement: Placement,
    bytes: Vec<u8>,
}

impl PresentationBuilder {
    /// Create a builder for a 16:9 canvas with the default title layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different canvas size (EMU).
    pub fn with_canvas(mut self, width: i64, height: i64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Use a different title slide layout.
    pub fn with_layout(mut self, layout: TitleLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Build the package and write it to `path`.
    pub fn write_to(&self, path: &Path, metadata: &Metadata, images: &[ImageAsset]) -> Result<()> {
        let bytes = self.build(metadata, images)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Build the package in memory.
    ///
    /// Images are placed in ascending index order regardless of the order
    /// they are passed in.
    pub fn build(&self, metadata: &Metadata, images: &[ImageAsset]) -> Result<Vec<u8>> {
        let mut ordered: Vec<&ImageAsset> = images.iter().collect();
        ordered.sort_by_key(|a| a.index);

        let mut pictures = Vec::with_capacity(ordered.len());
        let mut extensions = BTreeSet::new();
        for (i, asset) in ordered.iter().enumerate() {
            let ext = media_extension(&asset.path)?;
            let (px_width, px_height) = image::image_dimensions(&asset.path)?;
            let placement = place_image(self.width, self.height, px_width, px_height);
            log::debug!(
                "Slide {}: {} ({}x{} px) at y={}",
                i + 2,
                asset.path.display(),
                px_width,
                px_height,
                placement.y
            );
            pictures.push(PictureSlide {
                media_part: format!("ppt/media/image{}.{}", i + 1, ext),
                placement,
                bytes: std::fs::read(&asset.path)?,
            });
            extensions.insert(ext);
        }

        let slide_count = pictures.len() + 1;
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut put = |name: &str, data: &[u8]| -> Result<()> {
            zip.start_file(name, options)
                .map_err(|e| Error::ZipError(format!("Failed to add '{}': {}", name, e)))?;
            zip.write_all(data)?;
            Ok(())
        };

        put("[Content_Types].xml", content_types_xml(slide_count, &extensions).as_bytes())?;
        put("_rels/.rels", package_rels_xml().as_bytes())?;
        put("docProps/core.xml", core_props_xml(&metadata.name).as_bytes())?;
        put("docProps/app.xml", template::APP_PROPS.as_bytes())?;
        put("ppt/presentation.xml", self.presentation_xml(slide_count).as_bytes())?;
        put("ppt/_rels/presentation.xml.rels", presentation_rels_xml(slide_count).as_bytes())?;
        put("ppt/slideMasters/slideMaster1.xml", template::SLIDE_MASTER.as_bytes())?;
        put(
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            rels_xml(&[
                ("rId1", uri::REL_SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml"),
                ("rId2", uri::REL_THEME, "../theme/theme1.xml"),
            ])
            .as_bytes(),
        )?;
        put("ppt/slideLayouts/slideLayout1.xml", template::SLIDE_LAYOUT.as_bytes())?;
        put(
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
            rels_xml(&[("rId1", uri::REL_SLIDE_MASTER, "../slideMasters/slideMaster1.xml")]).as_bytes(),
        )?;
        put("ppt/theme/theme1.xml", template::THEME.as_bytes())?;

        put("ppt/slides/slide1.xml", self.title_slide_xml(metadata).as_bytes())?;
        put("ppt/slides/_rels/slide1.xml.rels", slide_rels_xml(None).as_bytes())?;

        for (i, picture) in pictures.iter().enumerate() {
            let number = i + 2;
            let media_file = picture
                .media_part
                .rsplit_once('/')
                .map(|(_, file)| file)
                .unwrap_or(&picture.media_part);
            put(
                &format!("ppt/slides/slide{}.xml", number),
                picture_slide_xml(&picture.placement, i + 1).as_bytes(),
            )?;
            put(
                &format!("ppt/slides/_rels/slide{}.xml.rels", number),
                slide_rels_xml(Some(&format!("../media/{}", media_file))).as_bytes(),
            )?;
            put(&picture.media_part, &picture.bytes)?;
        }

        let cursor = zip
            .finish()
            .map_err(|e| Error::ZipError(format!("Failed to finish package: {}", e)))?;
        Ok(cursor.into_inner())
    }

    fn presentation_xml(&self, slide_count: usize) -> String {
        let mut xml = String::with_capacity(1024);
        xml.push_str(XML_DECL);
        xml.push_str(&format!(
            r#"<p:presentation xmlns:a="{}" xmlns:r="{}" xmlns:p="{}" saveSubsetFonts="1">"#,
            NS_A, NS_R, NS_P
        ));
        xml.push_str(r#"<p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>"#);
        xml.push_str("<p:sldIdLst>");
        for i in 0..slide_count {
            xml.push_str(&format!(
                r#"<p:sldId id="{}" r:id="rId{}"/>"#,
                FIRST_SLIDE_ID + i,
                i + 3
            ));
        }
        xml.push_str("</p:sldIdLst>");
        xml.push_str(&format!(
            r#"<p:sldSz cx="{}" cy="{}"/>"#,
            self.width, self.height
        ));
        xml.push_str(r#"<p:notesSz cx="6858000" cy="9144000"/>"#);
        xml.push_str("</p:presentation>");
        xml
    }

    fn title_slide_xml(&self, metadata: &Metadata) -> String {
        let layout = &self.layout;
        let mut shapes = String::new();
        let fields = [
            (&layout.name, metadata.name.as_str(), "Name"),
            (&layout.number, metadata.number.as_str(), "Number"),
            (&layout.credits, metadata.credits.as_str(), "Credits"),
        ];
        for (i, (text_box, text, label)) in fields.iter().enumerate() {
            text_box_xml(&mut shapes, i + 2, label, text_box, &layout.typeface, text);
        }
        slide_xml(&shapes)
    }
}

/// Serialize one centered text box.
fn text_box_xml(xml: &mut String, id: usize, label: &str, text_box: &TextBox, typeface: &str, text: &str) {
    let style = &text_box.style;

    xml.push_str("<p:sp>");
    xml.push_str(&format!(
        r#"<p:nvSpPr><p:cNvPr id="{}" name="{}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr>"#,
        id, label
    ));
    xml.push_str("<p:spPr>");
    xml.push_str(&format!(
        r#"<a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm>"#,
        text_box.x, text_box.y, text_box.cx, text_box.cy
    ));
    xml.push_str(r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/>"#);
    xml.push_str("</p:spPr>");

    xml.push_str("<p:txBody>");
    xml.push_str(r#"<a:bodyPr wrap="square" rtlCol="0" anchor="ctr">"#);
    xml.push_str(if style.shrink_to_fit {
        "<a:normAutofit/>"
    } else {
        "<a:noAutofit/>"
    });
    xml.push_str("</a:bodyPr><a:lstStyle/>");

    let mut run_props = format!(r#"lang="en-US" sz="{}""#, style.size_pt * 100);
    if style.bold {
        run_props.push_str(r#" b="1""#);
    }
    if style.italic {
        run_props.push_str(r#" i="1""#);
    }
    run_props.push_str(r#" dirty="0""#);

    for line in text.split('\n') {
        xml.push_str(r#"<a:p><a:pPr algn="ctr"/><a:r>"#);
        xml.push_str(&format!(
            r#"<a:rPr {}><a:latin typeface="{}"/></a:rPr>"#,
            run_props,
            escape(typeface)
        ));
        xml.push_str(&format!("<a:t>{}</a:t>", escape(line)));
        xml.push_str("</a:r></a:p>");
    }

    xml.push_str("</p:txBody>");
    xml.push_str("</p:sp>");
}

fn picture_slide_xml(placement: &Placement, number: usize) -> String {
    let mut shapes = String::new();
    shapes.push_str("<p:pic>");
    shapes.push_str(&format!(
        r#"<p:nvPicPr><p:cNvPr id="2" name="Picture {}"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr>"#,
        number
    ));
    shapes.push_str(r#"<p:blipFill><a:blip r:embed="rId2"/><a:stretch><a:fillRect/></a:stretch></p:blipFill>"#);
    shapes.push_str(&format!(
        r#"<p:spPr><a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr>"#,
        placement.x, placement.y, placement.cx, placement.cy
    ));
    shapes.push_str("</p:pic>");
    slide_xml(&shapes)
}

fn slide_xml(shapes: &str) -> String {
    let mut xml = String::with_capacity(shapes.len() + 1024);
    xml.push_str(XML_DECL);
    xml.push_str(&format!(
        r#"<p:sld xmlns:a="{}" xmlns:r="{}" xmlns:p="{}">"#,
        NS_A, NS_R, NS_P
    ));
    xml.push_str("<p:cSld><p:spTree>");
    xml.push_str(SP_TREE_HEADER);
    xml.push_str(shapes);
    xml.push_str("</p:spTree></p:cSld>");
    xml.push_str("<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr>");
    xml.push_str("</p:sld>");
    xml
}

fn slide_rels_xml(image_target: Option<&str>) -> String {
    let mut rels = vec![("rId1", uri::REL_SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml")];
    if let Some(target) = image_target {
        rels.push(("rId2", uri::REL_IMAGE, target));
    }
    rels_xml(&rels)
}

fn presentation_rels_xml(slide_count: usize) -> String {
    let slide_targets: Vec<(String, String)> = (0..slide_count)
        .map(|i| (format!("rId{}", i + 3), format!("slides/slide{}.xml", i + 1)))
        .collect();

    let mut rels = vec![
        ("rId1", uri::REL_SLIDE_MASTER, "slideMasters/slideMaster1.xml"),
        ("rId2", uri::REL_THEME, "theme/theme1.xml"),
    ];
    for (id, target) in &slide_targets {
        rels.push((id.as_str(), uri::REL_SLIDE, target.as_str()));
    }
    rels_xml(&rels)
}

fn package_rels_xml() -> String {
    rels_xml(&[
        ("rId1", uri::REL_OFFICE_DOCUMENT, "ppt/presentation.xml"),
        ("rId2", uri::REL_CORE_PROPS, "docProps/core.xml"),
        ("rId3", uri::REL_APP_PROPS, "docProps/app.xml"),
    ])
}

fn rels_xml(rels: &[(&str, &str, &str)]) -> String {
    let mut xml = String::with_capacity(256 + rels.len() * 160);
    xml.push_str(XML_DECL);
    xml.push_str(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
    for (id, rel_type, target) in rels {
        xml.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
            id,
            rel_type,
            escape(target)
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

fn content_types_xml(slide_count: usize, media_extensions: &BTreeSet<&'static str>) -> String {
    let mut xml = String::with_capacity(2048);
    xml.push_str(XML_DECL);
    xml.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    xml.push_str(&format!(r#"<Default Extension="rels" ContentType="{}"/>"#, uri::CT_RELS));
    xml.push_str(&format!(r#"<Default Extension="xml" ContentType="{}"/>"#, uri::CT_XML));
    for ext in media_extensions {
        xml.push_str(&format!(
            r#"<Default Extension="{}" ContentType="{}"/>"#,
            ext,
            media_content_type(ext)
        ));
    }

    let mut overrides = vec![
        ("/ppt/presentation.xml".to_string(), uri::CT_PRESENTATION),
        ("/ppt/slideMasters/slideMaster1.xml".to_string(), uri::CT_SLIDE_MASTER),
        ("/ppt/slideLayouts/slideLayout1.xml".to_string(), uri::CT_SLIDE_LAYOUT),
        ("/ppt/theme/theme1.xml".to_string(), uri::CT_THEME),
        ("/docProps/core.xml".to_string(), uri::CT_CORE_PROPS),
        ("/docProps/app.xml".to_string(), uri::CT_APP_PROPS),
    ];
    for i in 1..=slide_count {
        overrides.push((format!("/ppt/slides/slide{}.xml", i), uri::CT_SLIDE));
    }
    for (part, content_type) in overrides {
        xml.push_str(&format!(
            r#"<Override PartName="{}" ContentType="{}"/>"#,
            part, content_type
        ));
    }

    xml.push_str("</Types>");
    xml
}

fn core_props_xml(title: &str) -> String {
    let mut xml = String::with_capacity(512);
    xml.push_str(XML_DECL);
    xml.push_str(concat!(
        r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" "#,
        r#"xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" "#,
        r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#
    ));
    xml.push_str(&format!("<dc:title>{}</dc:title>", escape(title)));
    xml.push_str("</cp:coreProperties>");
    xml
}

/// Normalized media extension for an image file.
fn media_extension(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Ok("png"),
        "jpg" | "jpeg" => Ok("jpeg"),
        "gif" => Ok("gif"),
        "bmp" => Ok("bmp"),
        "tif" | "tiff" => Ok("tiff"),
        _ => Err(Error::UnsupportedFormat(format!(
            "Cannot embed image {}",
            path.display()
        ))),
    }
}

fn media_content_type(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::PptxReader;
    use image::{Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> ImageAsset {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([0, 0, 0])).save(&path).unwrap();
        ImageAsset::from_path(path).unwrap()
    }

    fn metadata() -> Metadata {
        Metadata::new("Holy, Holy, Holy", "138", "Words: Reginald Heber\nMusic: John B. Dykes").unwrap()
    }

    #[test]
    fn test_place_image_centers_vertically() {
        let p = place_image(WIDE_WIDTH, WIDE_HEIGHT, 1200, 300);
        assert_eq!(p.x, 0);
        assert_eq!(p.cx, WIDE_WIDTH);
        assert_eq!(p.cy, 3_048_000);
        assert_eq!(p.y, (WIDE_HEIGHT - 3_048_000) / 2);
    }

    #[test]
    fn test_place_image_rounding() {
        for (w, h) in [(1000, 333), (1234, 567), (1600, 900), (997, 13)] {
            let p = place_image(WIDE_WIDTH, WIDE_HEIGHT, w, h);
            let expected = ((WIDE_HEIGHT - p.cy) as f64 / 2.0).round_ties_even() as i64;
            assert_eq!(p.y, expected);
            assert!(p.cy <= WIDE_HEIGHT);
        }
    }

    #[test]
    fn test_place_image_halves_round_to_even() {
        // 3 EMU tall leaves 6857997, so the top lands on 3428998.5
        let p = place_image(WIDE_WIDTH, WIDE_HEIGHT, 12_192_000, 3);
        assert_eq!(p.cy, 3);
        assert_eq!(p.y, 3_428_998);

        // 8 px wide at 4 EMU: heights of 1.5 and 2.5 both land on 2
        assert_eq!(place_image(4, 10, 8, 3).cy, 2);
        assert_eq!(place_image(4, 10, 8, 5).cy, 2);
        assert_eq!(place_image(4, 10, 8, 1).cy, 0);
    }

    #[test]
    fn test_text_box_escapes_text() {
        let mut xml = String::new();
        let layout = TitleLayout::default();
        text_box_xml(&mut xml, 2, "Name", &layout.name, "Calibri", "Rock <of> Ages & more");
        assert!(xml.contains("<a:t>Rock &lt;of&gt; Ages &amp; more</a:t>"));
        assert!(xml.contains(r#"sz="6000" b="1""#));
        assert!(xml.contains(r#"anchor="ctr""#));
        assert!(xml.contains(r#"algn="ctr""#));
    }

    #[test]
    fn test_media_extension() {
        assert_eq!(media_extension(Path::new("1.PNG")).unwrap(), "png");
        assert_eq!(media_extension(Path::new("2.jpg")).unwrap(), "jpeg");
        assert!(media_extension(Path::new("3.emf")).is_err());
    }

    #[test]
    fn test_build_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let images = vec![
            write_png(dir.path(), "10.png", 400, 100),
            write_png(dir.path(), "2.png", 400, 200),
            write_png(dir.path(), "1.png", 400, 50),
        ];

        let bytes = PresentationBuilder::new().build(&metadata(), &images).unwrap();
        let mut reader = PptxReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.slide_size(), (WIDE_WIDTH, WIDE_HEIGHT));

        let slides = reader.slides().unwrap();
        assert_eq!(slides.len(), 4);
        assert_eq!(
            slides[0].texts(),
            vec![
                "Holy, Holy, Holy",
                "138",
                "Words: Reginald Heber\nMusic: John B. Dykes"
            ]
        );

        // Heights follow index order 1, 2, 10
        let heights: Vec<i64> = slides[1..]
            .iter()
            .map(|s| s.pictures()[0].1.cy)
            .collect();
        assert_eq!(
            heights,
            vec![WIDE_WIDTH / 8, WIDE_WIDTH / 2, WIDE_WIDTH / 4]
        );

        for slide in &slides[1..] {
            let (_, t) = slide.pictures()[0];
            assert_eq!(t.x, 0);
            assert_eq!(t.cx, WIDE_WIDTH);
            assert_eq!(t.y, ((WIDE_HEIGHT - t.cy) as f64 / 2.0).round_ties_even() as i64);
        }
    }

    #[test]
    fn test_build_title_only() {
        let bytes = PresentationBuilder::new().build(&metadata(), &[]).unwrap();
        let mut reader = PptxReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.slide_count(), 1);
        assert_eq!(reader.read_metadata().unwrap(), metadata());
    }
}
