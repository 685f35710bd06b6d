//! Page Compositor
//!
//! Erases a destination page to a white canvas, then stamps keep zones back
//! from the pristine source document:
//!
//! 1. Replace the page's `/Contents` with a full-page white fill and its
//!    `/Resources` with an empty dictionary. Nothing of the original page
//!    (text, vector art, images) stays reachable from it.
//! 2. Wrap the same page of the source document as a Form XObject, copying
//!    every object it needs into the destination.
//! 3. For each zone, in order, draw that form clipped to the zone. The form
//!    sits at its original position, so each stamp is a window onto the
//!    original page.

use std::collections::{BTreeMap, HashMap};

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::error::{CropError, PagePhase};
use crate::geometry::{PageGeometry, UserRect, MAX_TREE_DEPTH};
use crate::region::KeepZone;

/// Resource name the restored source page is registered under
pub const STAMP_NAME: &str = "KZSrc";

/// Terminal state of a page. Erased is transient and never escapes `compose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Untouched,
    /// Erased, then this many zones stamped back
    Restored(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    /// Zero-based page index
    pub index: usize,
    pub state: PageState,
    /// Degenerate or off-page zones that drew nothing
    pub zones_skipped: usize,
}

/// Copies objects out of the source document, each at most once per
/// destination document.
pub struct ObjectImporter<'s> {
    source: &'s Document,
    imported: HashMap<ObjectId, ObjectId>,
}

impl<'s> ObjectImporter<'s> {
    pub fn new(source: &'s Document) -> Self {
        Self {
            source,
            imported: HashMap::new(),
        }
    }

    /// Number of distinct source objects copied so far
    pub fn imported_count(&self) -> usize {
        self.imported.len()
    }

    /// Deep-copy `obj`, rewriting references to destination ids.
    ///
    /// `/Parent` entries are dropped so the source page tree never follows.
    pub fn import(&mut self, dest: &mut Document, obj: &Object) -> Object {
        match obj {
            Object::Reference(id) => Object::Reference(self.import_reference(dest, *id)),
            Object::Array(items) => {
                Object::Array(items.iter().map(|o| self.import(dest, o)).collect())
            }
            Object::Dictionary(dict) => Object::Dictionary(self.import_dict(dest, dict)),
            Object::Stream(stream) => {
                let dict = self.import_dict(dest, &stream.dict);
                let mut copy = Stream::new(dict, stream.content.clone());
                copy.allows_compression = stream.allows_compression;
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }

    pub fn import_dict(&mut self, dest: &mut Document, dict: &Dictionary) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            if key.as_slice() == b"Parent" {
                continue;
            }
            copy.set(key.clone(), self.import(dest, value));
        }
        copy
    }

    fn import_reference(&mut self, dest: &mut Document, id: ObjectId) -> ObjectId {
        if let Some(new_id) = self.imported.get(&id) {
            return *new_id;
        }

        // Reserve the id first so reference cycles terminate
        let new_id = dest.new_object_id();
        self.imported.insert(id, new_id);

        // A dangling reference reads as null
        let source = self.source;
        let copy = match source.get_object(id) {
            Ok(obj) => self.import(dest, obj),
            Err(_) => Object::Null,
        };
        dest.objects.insert(new_id, copy);
        new_id
    }
}

/// Runs erase-then-restore for the pages of one document pair.
///
/// Holds the shared import table, so one instance must serve every page of
/// the destination document.
pub struct PageCompositor<'s> {
    source: &'s Document,
    source_pages: BTreeMap<u32, ObjectId>,
    importer: ObjectImporter<'s>,
}

impl<'s> PageCompositor<'s> {
    pub fn new(source: &'s Document) -> Self {
        Self {
            source,
            source_pages: source.get_pages(),
            importer: ObjectImporter::new(source),
        }
    }

    pub fn imported_count(&self) -> usize {
        self.importer.imported_count()
    }

    /// Erase page `index` of `dest` and restore `zones` from the source.
    ///
    /// An empty zone list leaves the page untouched.
    pub fn compose(
        &mut self,
        dest: &mut Document,
        dest_page: ObjectId,
        index: usize,
        zones: &[KeepZone],
        geometry: &PageGeometry,
    ) -> Result<PageOutcome, CropError> {
        if zones.is_empty() {
            return Ok(PageOutcome {
                index,
                state: PageState::Untouched,
                zones_skipped: 0,
            });
        }

        let content_id = erase_page(dest, dest_page, geometry)
            .map_err(|e| CropError::page(index, PagePhase::Erase, e))?;

        // Stamps never reach past the page box; zones with nothing left on
        // the page count as skipped
        let rects: Vec<UserRect> = zones
            .iter()
            .filter(|zone| !zone.is_degenerate())
            .filter_map(|zone| geometry.page_box.clip(&geometry.to_user_space(zone)))
            .collect();
        let zones_skipped = zones.len() - rects.len();

        if rects.is_empty() {
            debug!("Page {}: erased, no drawable zones", index);
            return Ok(PageOutcome {
                index,
                state: PageState::Restored(0),
                zones_skipped,
            });
        }

        let form_id = self
            .source_form(dest, index, geometry)
            .map_err(|e| CropError::page(index, PagePhase::Restore, e))?;
        stamp_zones(dest, dest_page, content_id, form_id, &rects)
            .map_err(|e| CropError::page(index, PagePhase::Restore, e))?;

        debug!(
            "Page {}: restored {} zone(s), skipped {}",
            index,
            rects.len(),
            zones_skipped
        );

        Ok(PageOutcome {
            index,
            state: PageState::Restored(rects.len()),
            zones_skipped,
        })
    }

    /// Wrap source page `index` as a Form XObject living in `dest`
    fn source_form(
        &mut self,
        dest: &mut Document,
        index: usize,
        geometry: &PageGeometry,
    ) -> Result<ObjectId, String> {
        let page_number = u32::try_from(index + 1).map_err(|e| e.to_string())?;
        let page_id = *self
            .source_pages
            .get(&page_number)
            .ok_or_else(|| format!("Source page {} not found", index))?;

        let content = page_content(self.source, page_id)?;
        let resources = inherited_resources(self.source, page_id)?;
        let resources = self.importer.import_dict(dest, &resources);

        let mut form = Dictionary::new();
        form.set("Type", Object::Name(b"XObject".to_vec()));
        form.set("Subtype", Object::Name(b"Form".to_vec()));
        form.set("FormType", Object::Integer(1));
        form.set("BBox", Object::Array(geometry.page_box.to_array()));
        form.set("Resources", Object::Dictionary(resources));

        Ok(dest.add_object(Object::Stream(Stream::new(form, content))))
    }
}

/// Replace the page's content with an opaque white fill.
///
/// Returns the id of the new content stream.
fn erase_page(
    dest: &mut Document,
    page_id: ObjectId,
    geometry: &PageGeometry,
) -> Result<ObjectId, lopdf::Error> {
    let page_box = geometry.page_box;
    let operations = vec![
        Operation::new("q", vec![]),
        Operation::new("g", vec![Object::Integer(1)]),
        Operation::new(
            "re",
            vec![
                Object::Real(page_box.llx as f32),
                Object::Real(page_box.lly as f32),
                Object::Real(page_box.width() as f32),
                Object::Real(page_box.height() as f32),
            ],
        ),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
    ];
    let encoded = Content { operations }.encode()?;
    let content_id = dest.add_object(Stream::new(Dictionary::new(), encoded));

    let page = dest.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Contents", Object::Reference(content_id));
    page.set("Resources", Object::Dictionary(Dictionary::new()));
    // A thumbnail is a raster of the whole original page
    page.remove(b"Thumb");

    Ok(content_id)
}

/// Append one clipped draw of the source form per rectangle
fn stamp_zones(
    dest: &mut Document,
    page_id: ObjectId,
    content_id: ObjectId,
    form_id: ObjectId,
    rects: &[UserRect],
) -> Result<(), lopdf::Error> {
    let mut operations = Vec::with_capacity(rects.len() * 6);
    for rect in rects {
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new(
            "re",
            vec![
                Object::Real(rect.x as f32),
                Object::Real(rect.y as f32),
                Object::Real(rect.width as f32),
                Object::Real(rect.height as f32),
            ],
        ));
        operations.push(Operation::new("W", vec![]));
        operations.push(Operation::new("n", vec![]));
        operations.push(Operation::new(
            "Do",
            vec![Object::Name(STAMP_NAME.as_bytes().to_vec())],
        ));
        operations.push(Operation::new("Q", vec![]));
    }
    let encoded = Content { operations }.encode()?;

    let stream = dest.get_object_mut(content_id)?.as_stream_mut()?;
    let mut content = stream.content.clone();
    content.push(b'\n');
    content.extend_from_slice(&encoded);
    stream.set_content(content);

    let mut xobjects = Dictionary::new();
    xobjects.set(STAMP_NAME, Object::Reference(form_id));
    let mut resources = Dictionary::new();
    resources.set("XObject", Object::Dictionary(xobjects));

    let page = dest.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// Concatenated, decoded content streams of a page
fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, String> {
    let page = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| format!("Page object unreadable: {}", e))?;

    let contents = match page.get(b"Contents") {
        Ok(obj) => obj,
        // A page without contents draws nothing
        Err(_) => return Ok(Vec::new()),
    };

    let mut streams = Vec::new();
    match resolve(doc, contents)? {
        Object::Array(items) => {
            for item in items {
                streams.push(resolve(doc, item)?);
            }
        }
        other => streams.push(other),
    }

    let mut out = Vec::new();
    for obj in streams {
        let stream = obj
            .as_stream()
            .map_err(|_| "Page content is not a stream".to_string())?;
        let bytes = if stream.dict.get(b"Filter").is_ok() {
            stream
                .decompressed_content()
                .map_err(|e| format!("Cannot decode content stream: {}", e))?
        } else {
            stream.content.clone()
        };
        out.extend_from_slice(&bytes);
        out.push(b'\n');
    }
    Ok(out)
}

/// Page resources, following `/Parent` inheritance. Missing means empty.
fn inherited_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, String> {
    let mut current = Some(page_id);
    let mut depth = 0;
    while let Some(id) = current {
        if depth > MAX_TREE_DEPTH {
            return Err("Page tree is too deep or cyclic".to_string());
        }
        let dict = doc
            .get_object(id)
            .and_then(Object::as_dict)
            .map_err(|e| format!("Page tree node unreadable: {}", e))?;
        if let Ok(resources) = dict.get(b"Resources") {
            return resolve(doc, resources)?
                .as_dict()
                .cloned()
                .map_err(|_| "Page resources are not a dictionary".to_string());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }
    Ok(Dictionary::new())
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object, String> {
    match obj {
        Object::Reference(id) => doc
            .get_object(*id)
            .map_err(|e| format!("Broken reference {} {}: {}", id.0, id.1, e)),
        other => Ok(other),
    }
}
