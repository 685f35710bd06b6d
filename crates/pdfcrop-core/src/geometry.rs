//! Page geometry
//!
//! Keep zones arrive in the page's displayed coordinate system (top-left
//! origin, y down, after `/Rotate`). Content streams live in PDF user space
//! (bottom-left origin, unrotated). This module bridges the two.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::region::KeepZone;

/// US Letter, used when a page carries no usable box at all
const DEFAULT_PAGE_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Upper bound on `/Parent` hops, guards against cyclic page trees
pub(crate) const MAX_TREE_DEPTH: usize = 64;

/// Visible page area in user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl PageBox {
    fn from_array(values: [f64; 4]) -> Self {
        let [x0, y0, x1, y1] = values;
        Self {
            llx: x0.min(x1),
            lly: y0.min(y1),
            urx: x0.max(x1),
            ury: y0.max(y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }

    fn intersect(&self, other: &PageBox) -> Option<PageBox> {
        let clipped = PageBox {
            llx: self.llx.max(other.llx),
            lly: self.lly.max(other.lly),
            urx: self.urx.min(other.urx),
            ury: self.ury.min(other.ury),
        };
        (clipped.width() > 0.0 && clipped.height() > 0.0).then_some(clipped)
    }

    /// Part of `rect` inside this box, `None` when nothing is left
    pub fn clip(&self, rect: &UserRect) -> Option<UserRect> {
        let llx = self.llx.max(rect.x);
        let lly = self.lly.max(rect.y);
        let urx = self.urx.min(rect.x + rect.width);
        let ury = self.ury.min(rect.y + rect.height);
        (urx > llx && ury > lly).then_some(UserRect {
            x: llx,
            y: lly,
            width: urx - llx,
            height: ury - lly,
        })
    }

    pub fn to_array(&self) -> Vec<Object> {
        vec![
            Object::Real(self.llx as f32),
            Object::Real(self.lly as f32),
            Object::Real(self.urx as f32),
            Object::Real(self.ury as f32),
        ]
    }
}

/// Rectangle in PDF user space, suitable for a `re` operator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Clockwise page rotation as applied by viewers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Quarter,
    Half,
    ThreeQuarter,
}

impl Rotation {
    pub fn from_degrees(angle: i64) -> Self {
        match angle.rem_euclid(360) {
            90 => Rotation::Quarter,
            180 => Rotation::Half,
            270 => Rotation::ThreeQuarter,
            _ => Rotation::None,
        }
    }

    pub fn degrees(&self) -> i64 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarter => 270,
        }
    }

    fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Quarter | Rotation::ThreeQuarter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page_box: PageBox,
    pub rotation: Rotation,
}

impl PageGeometry {
    /// Read CropBox (clipped to MediaBox) and rotation, following inheritance.
    pub fn read(doc: &Document, page_id: ObjectId) -> Result<Self, String> {
        let media_box = inherited(doc, page_id, b"MediaBox")?
            .map(|obj| parse_box(doc, obj))
            .transpose()?
            .unwrap_or(DEFAULT_PAGE_BOX);
        let media_box = PageBox::from_array(media_box);

        let crop_box = inherited(doc, page_id, b"CropBox")?
            .map(|obj| parse_box(doc, obj))
            .transpose()?
            .map(PageBox::from_array);

        let page_box = match crop_box {
            Some(crop) => crop.intersect(&media_box).unwrap_or(media_box),
            None => media_box,
        };

        let rotation = inherited(doc, page_id, b"Rotate")?
            .and_then(|obj| resolve(doc, obj).as_i64().ok())
            .map(Rotation::from_degrees)
            .unwrap_or(Rotation::None);

        Ok(Self { page_box, rotation })
    }

    /// Displayed width, the unit fractional x coordinates are relative to
    pub fn width(&self) -> f64 {
        if self.rotation.swaps_axes() {
            self.page_box.height()
        } else {
            self.page_box.width()
        }
    }

    /// Displayed height
    pub fn height(&self) -> f64 {
        if self.rotation.swaps_axes() {
            self.page_box.width()
        } else {
            self.page_box.height()
        }
    }

    /// Map a displayed-space zone into user space.
    ///
    /// Degenerate zones map to degenerate rectangles.
    pub fn to_user_space(&self, zone: &KeepZone) -> UserRect {
        let (ax, ay) = self.unrotate(zone.x0, zone.y0);
        let (bx, by) = self.unrotate(zone.x1, zone.y1);

        // Top-left origin, y down -> bottom-left origin, y up
        let (ux0, ux1) = (self.page_box.llx + ax.min(bx), self.page_box.llx + ax.max(bx));
        let (uy0, uy1) = (self.page_box.ury - ay.max(by), self.page_box.ury - ay.min(by));

        if zone.is_degenerate() {
            return UserRect {
                x: ux0,
                y: uy0,
                width: 0.0,
                height: 0.0,
            };
        }

        UserRect {
            x: ux0,
            y: uy0,
            width: ux1 - ux0,
            height: uy1 - uy0,
        }
    }

    /// Displayed point -> unrotated point, both top-left origin
    fn unrotate(&self, u: f64, v: f64) -> (f64, f64) {
        let w = self.page_box.width();
        let h = self.page_box.height();
        match self.rotation {
            Rotation::None => (u, v),
            Rotation::Quarter => (v, h - u),
            Rotation::Half => (w - u, h - v),
            Rotation::ThreeQuarter => (w - v, u),
        }
    }
}

/// Look up `key` on the page, then up the `/Parent` chain
fn inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, String> {
    let mut current = Some(page_id);
    let mut depth = 0;
    while let Some(id) = current {
        if depth > MAX_TREE_DEPTH {
            return Err("Page tree is too deep or cyclic".to_string());
        }
        let dict = node_dict(doc, id)?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(value));
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }
    Ok(None)
}

fn node_dict(doc: &Document, id: ObjectId) -> Result<&Dictionary, String> {
    doc.get_object(id)
        .and_then(Object::as_dict)
        .map_err(|_| format!("Object {} {} is not a page dictionary", id.0, id.1))
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Parse a box array `[x1 y1 x2 y2]`, resolving indirect entries
fn parse_box(doc: &Document, obj: &Object) -> Result<[f64; 4], String> {
    let array = resolve(doc, obj)
        .as_array()
        .map_err(|_| "Page box is not an array".to_string())?;
    if array.len() != 4 {
        return Err("Page box must have 4 elements".to_string());
    }

    let mut result = [0.0; 4];
    for (i, value) in array.iter().enumerate() {
        result[i] = match resolve(doc, value) {
            Object::Integer(n) => *n as f64,
            Object::Real(n) => *n as f64,
            _ => return Err(format!("Page box element {} is not a number", i)),
        };
    }
    Ok(result)
}
