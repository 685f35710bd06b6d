//! PDF fixtures built with lopdf

use lopdf::{dictionary, Dictionary, Document, Object, Stream};

pub(crate) struct TestPage {
    text: String,
    width: f64,
    height: f64,
    rotate: Option<i64>,
    image: bool,
    thumbnail: bool,
    broken: bool,
    unreadable_box: bool,
}

impl TestPage {
    pub(crate) fn letter(text: &str) -> Self {
        Self::sized(text, 612.0, 792.0)
    }

    pub(crate) fn sized(text: &str, width: f64, height: f64) -> Self {
        Self {
            text: text.to_string(),
            width,
            height,
            rotate: None,
            image: false,
            thumbnail: false,
            broken: false,
            unreadable_box: false,
        }
    }

    pub(crate) fn rotated(mut self, degrees: i64) -> Self {
        self.rotate = Some(degrees);
        self
    }

    pub(crate) fn with_image(mut self) -> Self {
        self.image = true;
        self
    }

    pub(crate) fn with_thumbnail(mut self) -> Self {
        self.thumbnail = true;
        self
    }

    /// Contents points at something that is not a stream
    pub(crate) fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// MediaBox with a non-numeric entry
    pub(crate) fn unreadable_box(mut self) -> Self {
        self.unreadable_box = true;
        self
    }
}

fn gray_image(doc: &mut Document) -> Object {
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => 2,
        "Height" => 2,
        "ColorSpace" => "DeviceGray",
        "BitsPerComponent" => 8,
    };
    Object::Reference(doc.add_object(Stream::new(dict, vec![0, 255, 255, 0])))
}

/// Build a PDF with one page per entry; all pages share one font object
pub(crate) fn build_pdf(pages: &[TestPage]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut page_ids = Vec::new();
    for page in pages {
        let mut content = format!("BT /F1 24 Tf 72 72 Td ({}) Tj ET\n", page.text);
        let mut resources = dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        };
        if page.image {
            let image = gray_image(&mut doc);
            resources.set("XObject", dictionary! { "Im1" => image });
            content.push_str("q 200 0 0 200 100 300 cm /Im1 Do Q\n");
        }

        let content_id = if page.broken {
            doc.add_object(Object::Integer(0))
        } else {
            doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()))
        };

        let mut dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(page.width as f32),
                Object::Real(page.height as f32),
            ],
            "Contents" => content_id,
            "Resources" => resources,
        };
        if page.unreadable_box {
            dict.set(
                "MediaBox",
                vec![0.into(), 0.into(), Object::Name(b"wide".to_vec())],
            );
        }
        if let Some(degrees) = page.rotate {
            dict.set("Rotate", Object::Integer(degrees));
        }
        if page.thumbnail {
            let thumb = gray_image(&mut doc);
            dict.set("Thumb", thumb);
        }
        page_ids.push(doc.add_object(dict));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => page_ids.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}
