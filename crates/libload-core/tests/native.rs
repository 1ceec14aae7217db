mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use libload_core::config::{find_manifest_dir, Manifest};
use libload_core::{
    DefaultFileProvider, DirectiveExecutor, Loader, LoaderConfig, ROOT_PREFIX_ENV,
};
use serial_test::serial;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, common::dedent(contents)).unwrap();
}

fn native_loader(config: LoaderConfig) -> (Loader, Arc<DirectiveExecutor>) {
    let executor = Arc::new(DirectiveExecutor::new());
    let loader = Loader::native(config, executor.clone());
    (loader, executor)
}

#[test]
fn loads_libraries_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(root, "core/__init__", "library core");
    write(
        root,
        "core/symbols.toml",
        r#"
        [symbols]
        Widget = { path = "widgets/widget.src" }
        "#,
    );
    write(root, "core/widgets/widget.src", "define Widget");
    write(root, "core/ui/__init__", "use Widget");

    let (loader, executor) = native_loader(LoaderConfig::default());
    loader.load_library(&root.join("core")).unwrap();

    assert!(loader.unit_exists("core", "ui").unwrap());
    assert!(!loader.unit_exists("core", "net").unwrap());
    loader.require_unit("core", "ui").unwrap();

    assert!(executor.is_defined("Widget"));
    assert!(loader.is_included(&root.join("core/widgets/widget.src")));
    assert_eq!(loader.units("core").unwrap(), vec!["ui"]);
}

#[test]
#[serial]
fn root_prefix_comes_from_the_environment() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "vendor/core/__init__", "library core");

    std::env::set_var(ROOT_PREFIX_ENV, tmp.path().join("vendor"));
    let config = LoaderConfig::from_env();
    std::env::remove_var(ROOT_PREFIX_ENV);

    let (loader, _) = native_loader(config);
    assert_eq!(loader.config().root_prefix, Some(tmp.path().join("vendor")));
    let root = loader.load_library(Path::new("core")).unwrap();

    assert_eq!(root, tmp.path().join("vendor/core"));
    assert_eq!(loader.libraries(), vec!["core"]);
}

#[test]
#[serial]
fn empty_root_prefix_is_ignored() {
    std::env::set_var(ROOT_PREFIX_ENV, "");
    let config = LoaderConfig::from_env();
    std::env::remove_var(ROOT_PREFIX_ENV);

    assert_eq!(config.root_prefix, None);
}

#[test]
fn manifest_registers_libraries_relative_to_its_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let ws = tmp.path();
    write(
        ws,
        "libload.toml",
        r#"
        root_prefix = "vendor"

        [libraries]
        app = "app/__init__"
        core = "vendor/core/__init__"
        "#,
    );
    write(ws, "app/__init__", "");
    write(ws, "vendor/core/__init__", "");
    write(ws, "app/src/main.src", "");

    let provider = DefaultFileProvider;
    let dir = find_manifest_dir(&provider, &ws.join("app/src/main.src")).unwrap();
    assert_eq!(dir, ws);

    let manifest = Manifest::load(&provider, &dir).unwrap();
    let config = LoaderConfig::default().with_root_prefix(manifest.root_prefix_in(&dir));
    let (loader, _) = native_loader(config);
    manifest.register_all(&loader, &dir).unwrap();

    assert_eq!(loader.libraries(), vec!["app", "core"]);
    assert_eq!(loader.library_root("core").unwrap(), ws.join("vendor/core"));
    assert_eq!(loader.load_library(Path::new("core")).unwrap(), ws.join("vendor/core"));
}
