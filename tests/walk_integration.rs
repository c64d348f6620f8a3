use classpath_index::bootstrap::bootstrap;
use classpath_index::error::ErrorCategory;
use classpath_index::filter::{AllowAllArchives, PrefixArchiveFilter};
use classpath_index::index::IndexCache;
use classpath_index::observer::{
    COMPONENT_INDEX, CONFIGURATION_INDEX, ClassNameIndexObserver, ComponentIndexObserver,
    DAO_INDEX, FEATURE_FLAG_INDEX, FEATURE_FLAG_RESOURCE, NAMED_COMPONENTS_RESOURCE,
    default_observers,
};
use classpath_index::properties::PropertyMap;
use classpath_index::walker::ClasspathWalker;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::FileOptions;

fn jar_bytes(entries: &[(&str, &str)]) -> anyhow::Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content.as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Writes an application archive whose module index lists `modules` in order.
fn write_application(path: &Path, modules: &[(&str, Vec<u8>)]) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let stored = FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    let index: String = modules
        .iter()
        .map(|(name, _)| format!("- \"{name}\"\n"))
        .collect();
    zip.start_file("BOOT-INF/classpath.idx", stored)?;
    zip.write_all(index.as_bytes())?;

    for (name, bytes) in modules {
        zip.start_file(*name, stored)?;
        zip.write_all(bytes)?;
    }
    zip.finish()?;
    Ok(())
}

fn read_cache(cache_root: &Path, name: &str) -> anyhow::Result<Option<Vec<String>>> {
    Ok(IndexCache::new(cache_root, name).read_lines()?)
}

fn component_walker() -> ClasspathWalker {
    ClasspathWalker::new(
        vec![Box::new(ComponentIndexObserver::named_components())],
        Box::new(AllowAllArchives),
    )
}

#[test]
fn module_boundaries_precede_their_entries() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app = dir.path().join("app.jar");
    write_application(
        &app,
        &[
            ("lib/A.jar", jar_bytes(&[(NAMED_COMPONENTS_RESOURCE, "com.x.Foo\n")])?),
            ("lib/none.jar", jar_bytes(&[("com/z/Plain.class", "")])?),
            ("lib/B.jar", jar_bytes(&[(NAMED_COMPONENTS_RESOURCE, "com.y.Bar\n")])?),
        ],
    )?;

    let cache_root = dir.path().join("cache");
    component_walker().walk(&app, &cache_root)?;

    assert_eq!(
        read_cache(&cache_root, COMPONENT_INDEX)?.unwrap(),
        vec!["- lib/A.jar", "com.x.Foo", "- lib/B.jar", "com.y.Bar"]
    );
    Ok(())
}

#[test]
fn second_walk_reuses_caches() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app = dir.path().join("app.jar");
    write_application(
        &app,
        &[(
            "lib/a.jar",
            jar_bytes(&[(NAMED_COMPONENTS_RESOURCE, "com.x.Foo\n")])?,
        )],
    )?;
    let cache_root = dir.path().join("cache");

    let first = component_walker().walk(&app, &cache_root)?;
    assert!(!first.skipped);
    assert_eq!(first.entries_claimed, 1);

    // the archive is gone; a walk that still opened it would fail
    std::fs::remove_file(&app)?;
    let second = component_walker().walk(&app, &cache_root)?;
    assert!(second.skipped);
    Ok(())
}

#[test]
fn observers_without_findings_leave_no_cache() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app = dir.path().join("app.jar");
    write_application(
        &app,
        &[(
            "lib/a.jar",
            jar_bytes(&[
                (NAMED_COMPONENTS_RESOURCE, "com.x.Foo\n"),
                ("com/x/UserDAO.class", ""),
            ])?,
        )],
    )?;
    let cache_root = dir.path().join("cache");

    let mut walker = ClasspathWalker::new(default_observers(), Box::new(AllowAllArchives));
    walker.walk(&app, &cache_root)?;

    assert!(IndexCache::new(&cache_root, COMPONENT_INDEX).exists());
    assert_eq!(
        read_cache(&cache_root, DAO_INDEX)?.unwrap(),
        vec!["com/x/UserDAO.class"]
    );
    assert!(!IndexCache::new(&cache_root, CONFIGURATION_INDEX).exists());
    assert!(!IndexCache::new(&cache_root, FEATURE_FLAG_INDEX).exists());

    // caches without findings are never written, so the fast path stays closed
    let mut again = ClasspathWalker::new(default_observers(), Box::new(AllowAllArchives));
    let summary = again.walk(&app, &cache_root)?;
    assert!(!summary.skipped);
    assert_eq!(summary.modules_walked, 1);
    assert!(!IndexCache::new(&cache_root, CONFIGURATION_INDEX).exists());
    Ok(())
}

#[test]
fn missing_nested_archive_is_an_index_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app = dir.path().join("app.jar");
    {
        let file = std::fs::File::create(&app)?;
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("BOOT-INF/classpath.idx", FileOptions::default())?;
        zip.write_all(b"- \"BOOT-INF/lib/missing.jar\"\n")?;
        zip.finish()?;
    }

    let err = component_walker()
        .walk(&app, &dir.path().join("cache"))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Index);
    Ok(())
}

#[test]
fn unreadable_archive_is_an_io_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let err = component_walker()
        .walk(&dir.path().join("absent.jar"), &dir.path().join("cache"))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Io);

    let garbage = dir.path().join("garbage.jar");
    std::fs::write(&garbage, b"definitely not a zip")?;
    let err = component_walker()
        .walk(&garbage, &dir.path().join("cache"))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Io);
    Ok(())
}

#[test]
fn malformed_flag_declaration_fails_the_walk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app = dir.path().join("app.jar");
    write_application(
        &app,
        &[(
            "lib/a.jar",
            jar_bytes(&[
                (NAMED_COMPONENTS_RESOURCE, "com.x.Foo\n"),
                (FEATURE_FLAG_RESOURCE, "com.x.Foo/flag.a/false\n"),
            ])?,
        )],
    )?;
    let cache_root = dir.path().join("cache");

    let mut walker = ClasspathWalker::new(default_observers(), Box::new(AllowAllArchives));
    let err = walker.walk(&app, &cache_root).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Parse);
    assert!(!IndexCache::new(&cache_root, COMPONENT_INDEX).exists());
    Ok(())
}

#[test]
fn exploded_application_walks_like_packaged() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app = dir.path().join("exploded");
    std::fs::create_dir_all(app.join("BOOT-INF/lib"))?;
    std::fs::write(
        app.join("BOOT-INF/classpath.idx"),
        "- \"BOOT-INF/lib/a.jar\"\n",
    )?;
    std::fs::write(
        app.join("BOOT-INF/lib/a.jar"),
        jar_bytes(&[("org/example/HttpsConnectorConfiguration.class", "")])?,
    )?;
    let cache_root = dir.path().join("cache");

    let mut walker = ClasspathWalker::new(
        vec![Box::new(ClassNameIndexObserver::connector_configurations())],
        Box::new(AllowAllArchives),
    );
    walker.walk(&app, &cache_root)?;
    assert_eq!(
        read_cache(&cache_root, CONFIGURATION_INDEX)?.unwrap(),
        vec!["org/example/HttpsConnectorConfiguration.class"]
    );
    Ok(())
}

#[test]
fn bootstrap_filters_flagged_components() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app = dir.path().join("app.jar");
    write_application(
        &app,
        &[
            (
                "BOOT-INF/lib/product-core.jar",
                jar_bytes(&[
                    (
                        NAMED_COMPONENTS_RESOURCE,
                        "com.x.Foo\ncom.x.jwt.JwtModule\ncom.x.session.SessionModule\n",
                    ),
                    (
                        FEATURE_FLAG_RESOURCE,
                        "com.x.jwt/nexus.jwt.enabled/false/false\ncom.x.session.SessionModule/nexus.session.legacy/false/true\n",
                    ),
                ])?,
            ),
            (
                "BOOT-INF/lib/guava.jar",
                jar_bytes(&[(NAMED_COMPONENTS_RESOURCE, "com.google.Thing\n")])?,
            ),
        ],
    )?;
    let cache_root = dir.path().join("cache");
    let filter = || Box::new(PrefixArchiveFilter::new(["product-"]));

    let defaults = bootstrap(&app, &cache_root, filter(), &PropertyMap::new())?;
    assert!(!defaults.summary().skipped);
    assert_eq!(defaults.summary().modules_filtered, 1);
    assert_eq!(
        defaults.components(COMPONENT_INDEX)?,
        vec!["com.x.Foo", "com.x.session.SessionModule"]
    );

    let mut jwt = PropertyMap::new();
    jwt.insert("nexus.jwt.enabled", "true");
    let enabled = bootstrap(&app, &cache_root, filter(), &jwt)?;
    assert_eq!(
        enabled.components(COMPONENT_INDEX)?,
        vec!["com.x.Foo", "com.x.jwt.JwtModule", "com.x.session.SessionModule"]
    );
    assert!(enabled.filter().conflicts().is_empty());
    assert!(enabled.allowed("com/x/jwt/internal/JwtFilter.class"));
    Ok(())
}
