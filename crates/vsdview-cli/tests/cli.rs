use assert_cmd::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use vsdview_core::testing::{PackageBuilder, PageSpec, rect_shape};

fn write_fixture(dir: &Path) -> PathBuf {
    let label = r#"<Shape ID="2" Type="Shape"><Cell N="PinX" V="3"/><Cell N="PinY" V="1"/><Cell N="Width" V="1"/><Cell N="Height" V="0.5"/><Text>Core Router</Text></Shape>"#;
    let bytes = PackageBuilder::new()
        .page(
            PageSpec::new(0, "Network", 4.0, 2.0)
                .shapes(&rect_shape(1, 1.0, 1.0, 1.0, 1.0))
                .shapes(label),
        )
        .page(PageSpec::new(1, "Notes", 4.0, 2.0).shapes(&rect_shape(1, 2.0, 1.0, 1.0, 1.0)))
        .build();
    let path = dir.join("network.vsdx");
    fs::write(&path, bytes).expect("write fixture");
    path
}

fn cli() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo_bin!("vsdview-cli"));
    cmd.env_remove("VSDVIEW_CONFIG").env_remove("VSDVIEW_LOG");
    cmd
}

#[test]
fn convert_writes_one_svg_per_page() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let input = write_fixture(tmp.path());
    let out = tmp.path().join("svg");

    cli()
        .args(["convert", "--out-dir", out.to_string_lossy().as_ref(), input.to_string_lossy().as_ref()])
        .assert()
        .success();

    for page in 1..=2 {
        let svg = fs::read_to_string(out.join(format!("network-page{page}.svg"))).expect("page svg");
        assert!(svg.starts_with("<svg"), "page {page} is not SVG");
    }
}

#[test]
fn single_page_goes_to_stdout() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let input = write_fixture(tmp.path());

    let output = cli()
        .args(["--page", "1", input.to_string_lossy().as_ref()])
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let svg = String::from_utf8(output.stdout).expect("utf8");
    assert!(svg.contains(r#"data-page-name="Network""#));
    assert!(svg.contains("Core Router"));
}

#[test]
fn pages_prints_the_page_index_as_json() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let input = write_fixture(tmp.path());

    let output = cli()
        .args(["pages", input.to_string_lossy().as_ref()])
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let pages: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(pages[0]["name"], "Network");
    assert_eq!(pages[0]["shape_count"], 2);
    assert_eq!(pages[1]["index"], 1);
}

#[test]
fn text_and_search_report_shape_text() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let input = write_fixture(tmp.path());

    let text = cli()
        .args(["text", input.to_string_lossy().as_ref()])
        .output()
        .expect("run cli");
    let text = String::from_utf8(text.stdout).expect("utf8");
    assert!(text.contains("== Network ==\nCore Router\n"));

    let hits = cli()
        .args(["search", "router", input.to_string_lossy().as_ref()])
        .output()
        .expect("run cli");
    assert_eq!(String::from_utf8(hits.stdout).expect("utf8"), "1\tNetwork\t2\tCore Router\n");
}

#[test]
fn usage_and_runtime_errors_have_distinct_exit_codes() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let input = write_fixture(tmp.path());

    cli().args(["--bogus"]).assert().code(2);
    cli().args(["pages"]).assert().code(2);

    cli()
        .args(["--page", "9", input.to_string_lossy().as_ref()])
        .assert()
        .code(1);

    let legacy = tmp.path().join("old.vsd");
    fs::write(&legacy, b"\xD0\xCF\x11\xE0").expect("write legacy");
    cli()
        .args(["pages", legacy.to_string_lossy().as_ref()])
        .assert()
        .code(1);
}

#[test]
fn config_file_options_apply() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let input = write_fixture(tmp.path());
    let config = tmp.path().join("vsdview.json");
    fs::write(&config, r#"{"render":{"px_per_inch":96}}"#).expect("write config");

    let output = cli()
        .args(["--page", "1", "--config", config.to_string_lossy().as_ref(), input.to_string_lossy().as_ref()])
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let svg = String::from_utf8(output.stdout).expect("utf8");
    assert!(svg.contains(r#"viewBox="0 0 384 192""#), "{svg}");

    fs::write(&config, "{ nope").expect("write config");
    cli()
        .args(["--config", config.to_string_lossy().as_ref(), input.to_string_lossy().as_ref()])
        .assert()
        .code(1);
}
