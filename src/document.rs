//! PDF export: the quantized image on top, a legend grid of swatches with
//! `#rrggbb (xx.x%)` labels below it, spilling onto further pages when the
//! grid runs out of room.
//!
//! Layout is computed first as plain data ([`Layout`]) and then written
//! with `lopdf`. All coordinates are PDF points, origin bottom-left.

use std::fmt;
use std::str::FromStr;

use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use tracing::debug;

use crate::error::{ReduceError, Result};
use crate::reconstruct::DistributionEntry;

pub const MIME_TYPE: &str = "application/pdf";

const POINTS_PER_MM: f32 = 72.0 / 25.4;

/// ISO A-series page sizes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PageSize {
    A0,
    A1,
    A2,
    A3,
    #[default]
    A4,
}

impl PageSize {
    pub const ALL: [PageSize; 5] = [
        PageSize::A0,
        PageSize::A1,
        PageSize::A2,
        PageSize::A3,
        PageSize::A4,
    ];

    /// Portrait (width, height) in millimetres.
    pub fn millimetres(self) -> (f32, f32) {
        match self {
            PageSize::A0 => (841.0, 1189.0),
            PageSize::A1 => (594.0, 841.0),
            PageSize::A2 => (420.0, 594.0),
            PageSize::A3 => (297.0, 420.0),
            PageSize::A4 => (210.0, 297.0),
        }
    }

    /// Portrait (width, height) in points.
    pub fn points(self) -> (f32, f32) {
        let (w, h) = self.millimetres();
        (w * POINTS_PER_MM, h * POINTS_PER_MM)
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageSize::A0 => "A0",
            PageSize::A1 => "A1",
            PageSize::A2 => "A2",
            PageSize::A3 => "A3",
            PageSize::A4 => "A4",
        };
        f.write_str(name)
    }
}

impl FromStr for PageSize {
    type Err = ReduceError;

    fn from_str(s: &str) -> Result<Self> {
        PageSize::ALL
            .into_iter()
            .find(|p| p.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                ReduceError::InvalidParameter(format!("unknown page size {s:?}, expected A0-A4"))
            })
    }
}

/// Fixed layout metrics, in points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderOptions {
    pub margin: f32,
    pub swatch: f32,
    pub row_height: f32,
    /// Label x offset from the swatch's left edge.
    pub label_offset: f32,
    pub column_width: f32,
    pub font_size: f32,
    /// Space between the bottom of the image and the first legend row.
    pub legend_gap: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            margin: 50.0,
            swatch: 20.0,
            row_height: 25.0,
            label_offset: 30.0,
            column_width: 160.0,
            font_size: 10.0,
            legend_gap: 20.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Bottom-left corner of one legend swatch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LegendCell {
    /// Index into the distribution (= cluster id).
    pub index: usize,
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Layout {
    pub page_width: f32,
    pub page_height: f32,
    /// Drawn on the first page.
    pub image: Placement,
    /// Legend cells per page; always at least one page.
    pub pages: Vec<Vec<LegendCell>>,
}

/// Place an `image_width` x `image_height` raster and `entries` legend cells.
///
/// The image is scaled to fit inside the margins with its aspect ratio kept,
/// centered horizontally and aligned to the top margin. Legend rows fill
/// left to right, then downward; a row that would cross the bottom margin
/// starts a new page at the top margin.
pub fn layout(
    image_width: u32,
    image_height: u32,
    entries: usize,
    page: PageSize,
    opts: &RenderOptions,
) -> Result<Layout> {
    if image_width == 0 || image_height == 0 {
        return Err(ReduceError::InvalidParameter(format!(
            "cannot lay out a {image_width}x{image_height} image"
        )));
    }

    let (page_width, page_height) = page.points();
    let max_width = page_width - 2.0 * opts.margin;
    let max_height = page_height - 2.0 * opts.margin;
    let scale = (max_width / image_width as f32).min(max_height / image_height as f32);
    let width = image_width as f32 * scale;
    let height = image_height as f32 * scale;
    let image = Placement {
        x: (page_width - width) / 2.0,
        y: page_height - opts.margin - height,
        width,
        height,
    };

    let columns = ((max_width / opts.column_width).floor() as usize).max(1);
    let top_row = page_height - opts.margin - opts.swatch;

    let mut pages = vec![Vec::new()];
    let mut row_y = image.y - opts.legend_gap - opts.swatch;
    let mut row_start = 0;
    while row_start < entries {
        if row_y < opts.margin {
            pages.push(Vec::new());
            row_y = top_row;
        }
        let row_end = (row_start + columns).min(entries);
        if let Some(cells) = pages.last_mut() {
            for (col, index) in (row_start..row_end).enumerate() {
                cells.push(LegendCell {
                    index,
                    x: opts.margin + col as f32 * opts.column_width,
                    y: row_y,
                });
            }
        }
        row_y -= opts.row_height;
        row_start = row_end;
    }

    Ok(Layout {
        page_width,
        page_height,
        image,
        pages,
    })
}

/// Render `image` and its legend into a PDF document.
pub fn render(
    image: &RgbImage,
    distribution: &[DistributionEntry],
    page: PageSize,
    opts: &RenderOptions,
) -> Result<Vec<u8>> {
    let layout = layout(image.width(), image.height(), distribution.len(), page, opts)?;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width() as i64,
            "Height" => image.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        image.as_raw().clone(),
    ));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
        "XObject" => dictionary! {
            "Im1" => image_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(layout.pages.len());
    for (page_no, cells) in layout.pages.iter().enumerate() {
        let mut operations = Vec::new();
        if page_no == 0 {
            operations.extend(image_ops(&layout.image));
        }
        for cell in cells {
            if let Some(entry) = distribution.get(cell.index) {
                operations.extend(legend_ops(cell, entry, opts));
            }
        }

        let content = Content { operations };
        let encoded = content.encode().map_err(document_error)?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), layout.page_width.into(), layout.page_height.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buf = Vec::new();
    doc.save_to(&mut buf).map_err(document_error)?;
    debug!(%page, pages = page_count, bytes = buf.len(), "document rendered");
    Ok(buf)
}

fn image_ops(p: &Placement) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                p.width.into(),
                0.into(),
                0.into(),
                p.height.into(),
                p.x.into(),
                p.y.into(),
            ],
        ),
        Operation::new("Do", vec!["Im1".into()]),
        Operation::new("Q", vec![]),
    ]
}

fn legend_ops(cell: &LegendCell, entry: &DistributionEntry, opts: &RenderOptions) -> Vec<Operation> {
    let c = entry.color;
    let label = format!("{} ({:.1}%)", entry.hex(), entry.percentage);
    vec![
        Operation::new(
            "rg",
            vec![
                (c.red as f32 / 255.0).into(),
                (c.green as f32 / 255.0).into(),
                (c.blue as f32 / 255.0).into(),
            ],
        ),
        Operation::new(
            "re",
            vec![cell.x.into(), cell.y.into(), opts.swatch.into(), opts.swatch.into()],
        ),
        Operation::new("f", vec![]),
        Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), opts.font_size.into()]),
        Operation::new(
            "Td",
            vec![(cell.x + opts.label_offset).into(), (cell.y + 5.0).into()],
        ),
        Operation::new("Tj", vec![Object::string_literal(label)]),
        Operation::new("ET", vec![]),
    ]
}

fn document_error(e: impl fmt::Display) -> ReduceError {
    ReduceError::Document(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use palette::Srgb;

    fn entries(n: usize) -> Vec<DistributionEntry> {
        (0..n)
            .map(|i| DistributionEntry {
                color: Srgb::new((i * 7) as u8, 100, 200),
                percentage: 100.0 / n as f64,
            })
            .collect()
    }

    #[test]
    fn test_page_size_points() {
        let (w, h) = PageSize::A4.points();
        assert!((w - 595.2756).abs() < 0.01);
        assert!((h - 841.8898).abs() < 0.01);
        let (w0, h0) = PageSize::A0.points();
        assert!((w0 - 2383.937).abs() < 0.01);
        assert!((h0 - 3370.394).abs() < 0.01);
    }

    #[test]
    fn test_page_size_parse() {
        assert_eq!("a3".parse::<PageSize>().unwrap(), PageSize::A3);
        assert_eq!("A0".parse::<PageSize>().unwrap(), PageSize::A0);
        assert!(matches!(
            "Letter".parse::<PageSize>(),
            Err(ReduceError::InvalidParameter(_))
        ));
        assert_eq!(PageSize::default(), PageSize::A4);
    }

    #[test]
    fn test_image_fits_and_keeps_aspect() {
        let opts = RenderOptions::default();
        let l = layout(400, 200, 0, PageSize::A4, &opts).unwrap();
        let img = l.image;
        assert!((img.width - (l.page_width - 100.0)).abs() < 1e-3);
        assert!((img.width / img.height - 2.0).abs() < 1e-4);
        assert!((img.x - 50.0).abs() < 1e-3);
        assert!((img.y + img.height - (l.page_height - 50.0)).abs() < 1e-3);
        assert_eq!(l.pages.len(), 1);
    }

    #[test]
    fn test_tall_image_is_centered_horizontally() {
        let opts = RenderOptions::default();
        let l = layout(100, 1000, 0, PageSize::A4, &opts).unwrap();
        let img = l.image;
        assert!((img.height - (l.page_height - 100.0)).abs() < 1e-3);
        let left = img.x;
        let right = l.page_width - img.x - img.width;
        assert!((left - right).abs() < 1e-3);
    }

    #[test]
    fn test_legend_grid_under_image() {
        let opts = RenderOptions::default();
        let l = layout(400, 200, 8, PageSize::A4, &opts).unwrap();
        assert_eq!(l.pages.len(), 1);
        let cells = &l.pages[0];
        assert_eq!(cells.len(), 8);

        // A4 fits three 160pt columns inside the margins.
        assert_eq!(cells[0].y, cells[2].y);
        assert!(cells[3].y < cells[2].y);
        assert!((cells[3].x - opts.margin).abs() < 1e-3);
        assert!(cells[0].y + opts.swatch <= l.image.y - opts.legend_gap + 1e-3);
        assert!(cells.iter().all(|c| c.y >= opts.margin));
    }

    #[test]
    fn test_legend_overflows_to_new_page() {
        let opts = RenderOptions::default();
        // Square image fills the page width, leaving little room below it.
        let l = layout(100, 100, 32, PageSize::A4, &opts).unwrap();
        assert!(l.pages.len() >= 2);

        let all: Vec<usize> = l.pages.iter().flatten().map(|c| c.index).collect();
        assert_eq!(all, (0..32).collect::<Vec<_>>());

        let second = &l.pages[1];
        assert!((second[0].y - (l.page_height - opts.margin - opts.swatch)).abs() < 1e-3);
        for page in &l.pages {
            assert!(page.iter().all(|c| c.y >= opts.margin));
        }
    }

    #[test]
    fn test_full_height_image_pushes_legend_to_next_page() {
        let opts = RenderOptions::default();
        let l = layout(10, 1000, 2, PageSize::A4, &opts).unwrap();
        assert_eq!(l.pages.len(), 2);
        assert!(l.pages[0].is_empty());
        assert_eq!(l.pages[1].len(), 2);
    }

    #[test]
    fn test_zero_sized_image_is_rejected() {
        assert!(layout(0, 5, 1, PageSize::A4, &RenderOptions::default()).is_err());
    }

    #[test]
    fn test_render_produces_pdf() {
        let img = RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]));
        let bytes = render(&img, &entries(4), PageSize::A4, &RenderOptions::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_render_paginates() {
        let img = RgbImage::from_pixel(50, 50, Rgb([0, 0, 0]));
        let opts = RenderOptions::default();
        let bytes = render(&img, &entries(32), PageSize::A4, &opts).unwrap();
        let expected = layout(50, 50, 32, PageSize::A4, &opts).unwrap().pages.len();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), expected);
        assert!(expected >= 2);
    }
}
