//! Two-document crop pipeline
//!
//! The destination document is edited page by page while a second copy,
//! loaded from the same bytes, stays pristine and feeds every restoration.

use std::collections::BTreeMap;

use lopdf::{Document, ObjectId};
use tracing::{debug, info, warn};

use crate::compositor::{PageCompositor, PageOutcome, PageState};
use crate::error::{CropError, PagePhase};
use crate::geometry::PageGeometry;
use crate::region::{resolve, KeepZoneMap};

/// Result of a crop run
#[derive(Debug, Clone)]
pub struct CropOutput {
    /// The saved PDF
    pub pdf: Vec<u8>,
    pub page_count: usize,
    /// One entry per in-range page present in the mapping, ascending
    pub pages: Vec<PageOutcome>,
}

/// Whiten everything outside the keep zones on each mapped page.
///
/// Pages absent from `zones`, or mapped to an empty list, are untouched. Keys
/// past the last page are ignored. If nothing would change, the input bytes
/// are returned as they are.
pub fn crop_document(bytes: &[u8], zones: &KeepZoneMap) -> Result<CropOutput, CropError> {
    let mut destination = load(bytes)?;
    let page_count = destination.get_pages().len();

    let in_range = zones.pages_in(page_count).count();
    if in_range < zones.len() {
        warn!(
            "Ignoring {} page key(s) beyond the document's {} page(s)",
            zones.len() - in_range,
            page_count
        );
    }

    if !zones.touches_any(page_count) {
        info!("No keep zones apply to this {}-page document", page_count);
        return Ok(CropOutput {
            pdf: bytes.to_vec(),
            page_count,
            pages: zones
                .pages_in(page_count)
                .map(|(index, _)| PageOutcome {
                    index,
                    state: PageState::Untouched,
                    zones_skipped: 0,
                })
                .collect(),
        });
    }

    let source = load(bytes)?;
    let pages = {
        let mut compositor = PageCompositor::new(&source);
        let mut outcomes = Vec::with_capacity(in_range);
        let page_ids = destination.get_pages();
        for (index, boxes) in zones.pages_in(page_count) {
            // An empty list never reaches the page object
            if boxes.is_empty() {
                outcomes.push(PageOutcome {
                    index,
                    state: PageState::Untouched,
                    zones_skipped: 0,
                });
                continue;
            }
            let page_id = page_object(&page_ids, index)?;
            let geometry = PageGeometry::read(&destination, page_id)
                .map_err(|e| CropError::page(index, PagePhase::Geometry, e))?;
            let keep = resolve(boxes, geometry.width(), geometry.height());
            debug!(
                "Page {}: {}x{} pt, rotation {}, {} zone(s)",
                index,
                geometry.width(),
                geometry.height(),
                geometry.rotation.degrees(),
                keep.len()
            );
            outcomes.push(compositor.compose(&mut destination, page_id, index, &keep, &geometry)?);
        }
        debug!("Imported {} object(s) from source", compositor.imported_count());
        outcomes
    };
    // The pristine copy is no longer needed once every page is restored
    drop(source);

    let pdf = save(destination)?;
    let restored = pages
        .iter()
        .filter(|p| matches!(p.state, PageState::Restored(_)))
        .count();
    info!(
        "Cropped {} of {} page(s), {} bytes out",
        restored,
        page_count,
        pdf.len()
    );

    Ok(CropOutput {
        pdf,
        page_count,
        pages,
    })
}

/// Parse PDF bytes and return the page count
pub fn page_count(bytes: &[u8]) -> Result<usize, CropError> {
    Ok(load(bytes)?.get_pages().len())
}

fn load(bytes: &[u8]) -> Result<Document, CropError> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| CropError::Input(format!("Failed to parse PDF: {}", e)))?;
    if doc.is_encrypted() {
        return Err(CropError::Input(
            "Encrypted PDFs are not supported".to_string(),
        ));
    }
    Ok(doc)
}

/// Object id of zero-based page `index` in a `get_pages` map
fn page_object(
    page_ids: &BTreeMap<u32, ObjectId>,
    index: usize,
) -> Result<ObjectId, CropError> {
    u32::try_from(index + 1)
        .ok()
        .and_then(|number| page_ids.get(&number).copied())
        .ok_or_else(|| CropError::page(index, PagePhase::Geometry, "page not found"))
}

fn save(mut doc: Document) -> Result<Vec<u8>, CropError> {
    // Drops everything erased pages no longer reach, images included
    doc.prune_objects();
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| CropError::Persistence(e.to_string()))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::STAMP_NAME;
    use crate::region::FractionalBox;
    use crate::test_support::{build_pdf, TestPage};
    use lopdf::content::Content;
    use lopdf::Object;
    use pretty_assertions::assert_eq;

    fn two_pages() -> Vec<u8> {
        build_pdf(&[TestPage::letter("Page 1"), TestPage::letter("Page 2")])
    }

    fn page_id(doc: &Document, index: usize) -> ObjectId {
        page_object(&doc.get_pages(), index).unwrap()
    }

    fn operations(doc: &Document, index: usize) -> Vec<(String, Vec<Object>)> {
        let bytes = doc.get_page_content(page_id(doc, index)).unwrap();
        Content::decode(&bytes)
            .unwrap()
            .operations
            .into_iter()
            .map(|op| (op.operator, op.operands))
            .collect()
    }

    fn operators(doc: &Document, index: usize) -> Vec<String> {
        operations(doc, index).into_iter().map(|(op, _)| op).collect()
    }

    fn numbers(operands: &[Object]) -> Vec<f64> {
        operands
            .iter()
            .map(|o| match o {
                Object::Integer(n) => *n as f64,
                Object::Real(n) => *n as f64,
                _ => f64::NAN,
            })
            .collect()
    }

    /// Clip rectangles of the restoration stamps, in drawing order
    fn stamp_clips(doc: &Document, index: usize) -> Vec<Vec<f64>> {
        let ops = operations(doc, index);
        ops.windows(2)
            .filter(|w| w[0].0 == "re" && w[1].0 == "W")
            .map(|w| numbers(&w[0].1))
            .collect()
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 0.01, "{:?} != {:?}", actual, expected);
        }
    }

    fn stamp_form(doc: &Document, index: usize) -> &lopdf::Stream {
        let page = doc.get_object(page_id(doc, index)).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let form_id = xobjects
            .get(STAMP_NAME.as_bytes())
            .unwrap()
            .as_reference()
            .unwrap();
        doc.get_object(form_id).unwrap().as_stream().unwrap()
    }

    fn form_content(stream: &lopdf::Stream) -> String {
        let bytes = if stream.dict.get(b"Filter").is_ok() {
            stream.decompressed_content().unwrap()
        } else {
            stream.content.clone()
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn single(page: usize, boxes: Vec<FractionalBox>) -> KeepZoneMap {
        vec![(page, boxes)].into_iter().collect()
    }

    #[test]
    fn test_invalid_pdf_is_input_error() {
        let result = crop_document(b"not a pdf", &KeepZoneMap::new());
        assert!(matches!(result, Err(CropError::Input(_))));
    }

    #[test]
    fn test_empty_mapping_returns_input() {
        let pdf = two_pages();
        let out = crop_document(&pdf, &KeepZoneMap::new()).unwrap();
        assert_eq!(out.pdf, pdf);
        assert_eq!(out.page_count, 2);
        assert!(out.pages.is_empty());
    }

    #[test]
    fn test_empty_box_list_is_noop() {
        let pdf = two_pages();
        let out = crop_document(&pdf, &single(0, vec![])).unwrap();
        assert_eq!(out.pdf, pdf);
        assert_eq!(out.pages[0].state, PageState::Untouched);
    }

    #[test]
    fn test_out_of_range_pages_ignored() {
        let pdf = two_pages();
        let zones = single(5, vec![FractionalBox::full_page()]);
        let out = crop_document(&pdf, &zones).unwrap();
        assert_eq!(out.pdf, pdf);
        assert_eq!(page_count(&out.pdf).unwrap(), 2);
    }

    #[test]
    fn test_single_zone_example() {
        let pdf = two_pages();
        let original = Document::load_mem(&pdf).unwrap();
        let zones = single(0, vec![FractionalBox::new(0.1, 0.1, 0.3, 0.3)]);

        let out = crop_document(&pdf, &zones).unwrap();
        assert_eq!(out.page_count, 2);
        assert_eq!(out.pages[0].state, PageState::Restored(1));

        let doc = Document::load_mem(&out.pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 2);

        // White canvas first, then one clipped stamp
        assert_eq!(
            operators(&doc, 0),
            vec!["q", "g", "re", "f", "Q", "q", "re", "W", "n", "Do", "Q"]
        );
        let ops = operations(&doc, 0);
        assert_close(&numbers(&ops[2].1), &[0.0, 0.0, 612.0, 792.0]);
        assert_eq!(stamp_clips(&doc, 0), vec![numbers(&ops[6].1)]);
        assert_close(&stamp_clips(&doc, 0)[0], &[61.2, 475.2, 183.6, 237.6]);

        // The stamp is the original page, at its original position
        let form = stamp_form(&doc, 0);
        assert!(form_content(form).contains("(Page 1) Tj"));
        let bbox = numbers(form.dict.get(b"BBox").unwrap().as_array().unwrap());
        assert_close(&bbox, &[0.0, 0.0, 612.0, 792.0]);

        // Page 2 is left alone
        assert_eq!(
            doc.get_page_content(page_id(&doc, 1)).unwrap(),
            original.get_page_content(page_id(&original, 1)).unwrap()
        );
    }

    #[test]
    fn test_full_page_zone_restores_everything() {
        let pdf = two_pages();
        let original = Document::load_mem(&pdf).unwrap();
        let out = crop_document(&pdf, &single(1, vec![FractionalBox::full_page()])).unwrap();
        let doc = Document::load_mem(&out.pdf).unwrap();

        assert_close(&stamp_clips(&doc, 1)[0], &[0.0, 0.0, 612.0, 792.0]);
        let restored = form_content(stamp_form(&doc, 1));
        let source = String::from_utf8_lossy(
            &original.get_page_content(page_id(&original, 1)).unwrap(),
        )
        .into_owned();
        assert_eq!(restored.trim(), source.trim());
    }

    #[test]
    fn test_degenerate_zone_leaves_blank_page() {
        let pdf = two_pages();
        let zones = single(0, vec![FractionalBox::new(0.2, 0.2, 0.0, 0.4)]);
        let out = crop_document(&pdf, &zones).unwrap();
        assert_eq!(out.pages[0].state, PageState::Restored(0));
        assert_eq!(out.pages[0].zones_skipped, 1);

        let doc = Document::load_mem(&out.pdf).unwrap();
        assert_eq!(operators(&doc, 0), vec!["q", "g", "re", "f", "Q"]);
        let page = doc.get_object(page_id(&doc, 0)).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        assert!(resources.get(b"XObject").is_err());
    }

    #[test]
    fn test_zones_stamp_in_input_order() {
        let pdf = two_pages();
        let a = FractionalBox::new(0.0, 0.0, 0.5, 0.5);
        let b = FractionalBox::new(0.25, 0.25, 0.5, 0.5);

        let forward = crop_document(&pdf, &single(0, vec![a, b])).unwrap();
        let reverse = crop_document(&pdf, &single(0, vec![b, a])).unwrap();

        let forward = stamp_clips(&Document::load_mem(&forward.pdf).unwrap(), 0);
        let reverse = stamp_clips(&Document::load_mem(&reverse.pdf).unwrap(), 0);
        assert_eq!(forward.len(), 2);
        assert_close(&forward[0], &[0.0, 396.0, 306.0, 396.0]);
        assert_close(&forward[1], &[153.0, 198.0, 306.0, 396.0]);
        assert_eq!(forward[0], reverse[1]);
        assert_eq!(forward[1], reverse[0]);
    }

    #[test]
    fn test_two_zones_share_one_stamp_form() {
        let pdf = two_pages();
        let zones = single(
            0,
            vec![
                FractionalBox::new(0.0, 0.0, 0.2, 0.2),
                FractionalBox::new(0.6, 0.6, 0.2, 0.2),
            ],
        );
        let out = crop_document(&pdf, &zones).unwrap();
        let doc = Document::load_mem(&out.pdf).unwrap();
        let forms = doc
            .objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .filter(|s| matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Form"))
            .count();
        assert_eq!(forms, 1);
        assert_eq!(out.pages[0].state, PageState::Restored(2));
    }

    #[test]
    fn test_shared_resources_imported_once() {
        let pdf = two_pages();
        let zones: KeepZoneMap = vec![
            (0, vec![FractionalBox::full_page()]),
            (1, vec![FractionalBox::full_page()]),
        ]
        .into_iter()
        .collect();
        let out = crop_document(&pdf, &zones).unwrap();
        let doc = Document::load_mem(&out.pdf).unwrap();

        let fonts = doc
            .objects
            .values()
            .filter_map(|o| o.as_dict().ok())
            .filter(|d| matches!(d.get(b"Type"), Ok(Object::Name(n)) if n == b"Font"))
            .count();
        assert_eq!(fonts, 1);
    }

    #[test]
    fn test_images_outside_zones_are_dropped() {
        let pdf = build_pdf(&[TestPage::letter("Secret").with_image().with_thumbnail()]);
        let zones = single(0, vec![FractionalBox::new(0.5, 0.5, 0.0, 0.0)]);
        let out = crop_document(&pdf, &zones).unwrap();
        let doc = Document::load_mem(&out.pdf).unwrap();

        let images = doc
            .objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .filter(|s| matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image"))
            .count();
        assert_eq!(images, 0);

        let page = doc.get_object(page_id(&doc, 0)).unwrap().as_dict().unwrap();
        assert!(page.get(b"Thumb").is_err());
    }

    #[test]
    fn test_rotated_page_uses_displayed_size() {
        let pdf = build_pdf(&[TestPage::letter("Turned").rotated(90)]);
        // Left half of the displayed (landscape) page
        let zones = single(0, vec![FractionalBox::new(0.0, 0.0, 0.5, 1.0)]);
        let out = crop_document(&pdf, &zones).unwrap();
        let doc = Document::load_mem(&out.pdf).unwrap();

        // Displayed left half of a 90-degree page is the unrotated bottom half
        assert_close(&stamp_clips(&doc, 0)[0], &[0.0, 0.0, 612.0, 396.0]);
    }

    #[test]
    fn test_pages_of_different_sizes() {
        let pdf = build_pdf(&[TestPage::letter("Letter"), TestPage::sized("A5", 420.0, 595.0)]);
        let zones = single(1, vec![FractionalBox::new(0.5, 0.5, 0.5, 0.5)]);
        let out = crop_document(&pdf, &zones).unwrap();
        let doc = Document::load_mem(&out.pdf).unwrap();
        assert_close(&stamp_clips(&doc, 1)[0], &[210.0, 0.0, 210.0, 297.5]);
    }

    #[test]
    fn test_broken_page_content_reports_page() {
        let pdf = build_pdf(&[TestPage::letter("Fine"), TestPage::letter("Bad").broken()]);
        let zones = single(1, vec![FractionalBox::new(0.1, 0.1, 0.5, 0.5)]);
        match crop_document(&pdf, &zones) {
            Err(CropError::PageProcessing { page, phase, .. }) => {
                assert_eq!(page, 1);
                assert_eq!(phase, PagePhase::Restore);
            }
            other => panic!("expected page error, got {:?}", other.map(|o| o.pages)),
        }
    }

    #[test]
    fn test_empty_list_skips_unreadable_page() {
        let pdf = build_pdf(&[
            TestPage::letter("Kept"),
            TestPage::letter("Odd box").unreadable_box(),
        ]);
        let original = Document::load_mem(&pdf).unwrap();
        let zones: KeepZoneMap = vec![(0, vec![FractionalBox::full_page()]), (1, vec![])]
            .into_iter()
            .collect();

        let out = crop_document(&pdf, &zones).unwrap();
        assert_eq!(out.pages[0].state, PageState::Restored(1));
        assert_eq!(out.pages[1].state, PageState::Untouched);

        let doc = Document::load_mem(&out.pdf).unwrap();
        assert_eq!(
            doc.get_page_content(page_id(&doc, 1)).unwrap(),
            original.get_page_content(page_id(&original, 1)).unwrap()
        );
    }

    #[test]
    fn test_huge_coordinates_stay_inside_page() {
        let pdf = two_pages();
        let zones = single(
            0,
            vec![
                FractionalBox::new(1e37, 0.0, 1e37, 0.5),
                FractionalBox::new(-1e37, 0.0, 2e37, 0.5),
            ],
        );
        let out = crop_document(&pdf, &zones).unwrap();
        assert_eq!(out.pages[0].state, PageState::Restored(1));
        assert_eq!(out.pages[0].zones_skipped, 1);

        let doc = Document::load_mem(&out.pdf).unwrap();
        let content = doc.get_page_content(page_id(&doc, 0)).unwrap();
        assert!(!String::from_utf8_lossy(&content).contains("inf"));
        let clips = stamp_clips(&doc, 0);
        assert_eq!(clips.len(), 1);
        assert_close(&clips[0], &[0.0, 396.0, 612.0, 396.0]);
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(&two_pages()).unwrap(), 2);
        assert!(page_count(b"%PDF-garbage").is_err());
    }
}
