use vsdview::{
    ConvertConfig, ConvertError, HeadlessConverter, SvgRenderOptions, convert, convert_page,
    convert_path, extract_text, open_bytes, open_path, page_index, search_text,
};
use vsdview_core::ParseOptions;
use vsdview_core::testing::{PackageBuilder, PageSpec, rect_shape};

fn text_shape(id: u32, pin_x: f64, text: &str) -> String {
    format!(
        r#"<Shape ID="{id}" Type="Shape"><Cell N="PinX" V="{pin_x}"/><Cell N="PinY" V="1"/><Cell N="Width" V="1"/><Cell N="Height" V="0.5"/><Text>{text}</Text></Shape>"#
    )
}

fn two_page_package() -> Vec<u8> {
    PackageBuilder::new()
        .page(
            PageSpec::new(0, "Overview", 8.5, 11.0)
                .shapes(&rect_shape(1, 1.0, 1.0, 1.0, 1.0))
                .shapes(&text_shape(2, 3.0, "Load Balancer"))
                .shapes(&text_shape(3, 5.0, "Database")),
        )
        .page(PageSpec::new(1, "Legend", 11.0, 8.5).background().shapes(&text_shape(1, 1.0, "Legend: balancer")))
        .build()
}

#[test]
fn convert_emits_one_svg_per_page_in_order() {
    let doc = open_bytes(&two_page_package(), &ParseOptions::default()).unwrap();
    let pages = convert(&doc, &SvgRenderOptions::default()).unwrap();
    assert_eq!(pages.len(), 2);
    for (i, svg) in pages.iter().enumerate() {
        let tree = roxmltree::Document::parse(svg).unwrap();
        let root = tree.root_element();
        assert!(root.has_tag_name(("http://www.w3.org/2000/svg", "svg")));
        assert_eq!(root.attribute("data-page-index"), Some(i.to_string().as_str()));
    }
    assert!(pages[0].contains("Load Balancer"));

    assert!(convert_page(&doc, 5, &SvgRenderOptions::default()).unwrap().is_none());
    assert_eq!(
        convert_page(&doc, 1, &SvgRenderOptions::default()).unwrap().as_deref(),
        Some(pages[1].as_str())
    );
}

#[test]
fn page_index_lists_pages_with_sizes() {
    let doc = open_bytes(&two_page_package(), &ParseOptions::default()).unwrap();
    let index = page_index(&doc);
    assert_eq!(index.len(), 2);
    assert_eq!(index[0].name, "Overview");
    assert_eq!(index[0].shape_count, 3);
    assert_eq!((index[0].width, index[0].height), (8.5, 11.0));
    assert!(!index[0].is_background);
    assert!(index[1].is_background);
}

#[test]
fn text_is_grouped_by_page_and_searchable() {
    let doc = open_bytes(&two_page_package(), &ParseOptions::default()).unwrap();
    let texts = extract_text(&doc);
    assert_eq!(texts[0].to_string(), "Load Balancer\nDatabase");
    assert_eq!(texts[1].name, "Legend");

    let hits = search_text(&doc, "BALANCER");
    let found: Vec<(usize, u32)> = hits.iter().map(|m| (m.page_index, m.shape_id)).collect();
    assert_eq!(found, [(0, 2), (1, 1)]);
    assert!(search_text(&doc, "  ").is_empty());
}

#[test]
fn unparseable_pages_are_skipped() {
    let bytes = PackageBuilder::new()
        .page(PageSpec::new(0, "Good", 8.5, 11.0).shapes(&rect_shape(1, 1.0, 1.0, 1.0, 1.0)))
        .page(PageSpec::new(1, "Broken", 8.5, 11.0).shapes(r#"<Shape ID="2">"#))
        .build();
    let doc = open_bytes(&bytes, &ParseOptions::default()).unwrap();
    assert!(!doc.report.is_clean());

    let pages = convert(&doc, &SvgRenderOptions::default()).unwrap();
    assert_eq!(pages.len(), 1);
    assert!(pages[0].contains(r#"data-page-name="Good""#));
    let names: Vec<String> = page_index(&doc).into_iter().map(|p| p.name).collect();
    assert_eq!(names, ["Good"]);
}

#[test]
fn stencil_without_pages_cannot_be_converted() {
    let bytes = PackageBuilder::new()
        .master(1, "Box", &rect_shape(1, 0.5, 0.5, 1.0, 1.0))
        .without_pages_index()
        .build();
    let doc = open_bytes(&bytes, &ParseOptions::default()).unwrap();
    assert_eq!(doc.page_count(), 0);
    let err = convert(&doc, &SvgRenderOptions::default()).unwrap_err();
    assert!(matches!(err, ConvertError::ConversionUnavailable { .. }));
}

#[test]
fn paths_follow_the_extension_policy() {
    let dir = tempfile::tempdir().unwrap();
    let drawing = dir.path().join("network.vsdx");
    std::fs::write(&drawing, two_page_package()).unwrap();
    assert_eq!(convert_path(&drawing, &ConvertConfig::default()).unwrap().len(), 2);

    let legacy = dir.path().join("network.vsd");
    std::fs::write(&legacy, b"\xD0\xCF\x11\xE0").unwrap();
    let err = open_path(&legacy, &ParseOptions::default()).unwrap_err();
    assert!(matches!(err, ConvertError::ConversionUnavailable { .. }));

    let garbage = dir.path().join("notes.vsdx");
    std::fs::write(&garbage, b"plain text").unwrap();
    assert!(matches!(
        open_path(&garbage, &ParseOptions::default()).unwrap_err(),
        ConvertError::Core(_)
    ));
}

#[test]
fn headless_converter_prefixes_ids() {
    let converter = HeadlessConverter::new();
    let doc = converter.open_bytes(&two_page_package()).unwrap();
    let svg = converter
        .convert_page_with_diagram_id(&doc, 0, "my diagram")
        .unwrap()
        .unwrap();
    assert!(svg.contains(r#"id="my-diagram""#));
    assert!(svg.contains(r#"id="my-diagram-shape-1""#));
}

#[test]
fn media_dir_receives_embedded_bitmaps() {
    let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    let shape = r#"<Shape ID="1" Type="Foreign"><Cell N="PinX" V="1"/><Cell N="PinY" V="1"/><Cell N="Width" V="1"/><Cell N="Height" V="1"/><ForeignData ForeignType="Bitmap" CompressionType="PNG"><Rel r:id="rId1"/></ForeignData></Shape>"#;
    let bytes = PackageBuilder::new()
        .page(
            PageSpec::new(0, "Page-1", 2.0, 2.0)
                .shapes(shape)
                .rel("rId1", "../media/image1.png"),
        )
        .part("visio/media/image1.png", png)
        .build();

    let inline = HeadlessConverter::new().convert_bytes(&bytes).unwrap();
    assert!(inline[0].contains("data:image/png;base64,"));

    let dir = tempfile::tempdir().unwrap();
    let media = dir.path().join("media");
    let written = HeadlessConverter::new()
        .with_media_dir(&media)
        .convert_bytes(&bytes)
        .unwrap();
    assert_eq!(std::fs::read(media.join("image1.png")).unwrap(), png);
    assert!(written[0].contains("image1.png"));
}

#[test]
fn extracted_media_is_named_by_its_content() {
    let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    let shape = r#"<Shape ID="1" Type="Foreign"><Cell N="PinX" V="1"/><Cell N="PinY" V="1"/><Cell N="Width" V="1"/><Cell N="Height" V="1"/><ForeignData ForeignType="Bitmap"><Rel r:id="rId1"/></ForeignData></Shape>"#;
    let bytes = PackageBuilder::new()
        .page(
            PageSpec::new(0, "Page-1", 2.0, 2.0)
                .shapes(shape)
                .rel("rId1", "../media/image2.emf"),
        )
        .part("visio/media/image2.emf", png)
        .build();

    let dir = tempfile::tempdir().unwrap();
    let svg = HeadlessConverter::new()
        .with_media_dir(dir.path())
        .convert_bytes(&bytes)
        .unwrap();
    assert_eq!(std::fs::read(dir.path().join("image2.png")).unwrap(), png);
    assert!(!dir.path().join("image2.emf").exists());
    assert!(svg[0].contains("image2.png"));
}
