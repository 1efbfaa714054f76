//! Qt plugin selection.
//!
//! Qt loads plugins at runtime, so no import table names them. The plugin
//! categories to ship are inferred from the Qt modules the staged binaries
//! link against.

use crate::error::Result;
use crate::staging::copy_tree;
use camino::Utf8Path;
use std::collections::BTreeSet;

/// Plugin categories loaded by each Qt module.
const PLUGIN_CATEGORIES: &[(&str, &[&str])] = &[
    ("Qt5Gui", &["platforms", "imageformats", "iconengines", "platforminputcontexts"]),
    ("Qt5Multimedia", &["audio", "mediaservice", "playlistformats"]),
    ("Qt5Network", &["bearer"]),
    ("Qt5Positioning", &["position"]),
    ("Qt5PrintSupport", &["printsupport"]),
    ("Qt5Quick", &["scenegraph"]),
    ("Qt5Sensors", &["sensors", "sensorgestures"]),
    ("Qt5Sql", &["sqldrivers"]),
    ("Qt5Svg", &["iconengines", "imageformats"]),
    ("Qt5Widgets", &["styles"]),
];

/// Qt module names (`Qt5Core`, `Qt5Gui`, ...) among the given library
/// paths.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use webcamoid_deploy::plugins::qt_modules;
///
/// let modules = qt_modules([
///     Utf8Path::new("/usr/x86_64-w64-mingw32/lib/qt/bin/Qt5Gui.dll"),
///     Utf8Path::new("/stage/bin/webcamoid.exe"),
/// ]);
/// assert!(modules.contains("Qt5Gui"));
/// assert_eq!(modules.len(), 1);
/// ```
#[must_use]
pub fn qt_modules<'a, I>(paths: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a Utf8Path>,
{
    paths
        .into_iter()
        .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("dll")))
        .filter_map(Utf8Path::file_stem)
        .filter(|stem| stem.starts_with("Qt5"))
        .map(str::to_owned)
        .collect()
}

/// Plugin categories needed by `modules`, sorted and deduplicated.
#[must_use]
pub fn plugin_categories(modules: &BTreeSet<String>) -> BTreeSet<&'static str> {
    PLUGIN_CATEGORIES
        .iter()
        .filter(|(module, _)| modules.contains(*module))
        .flat_map(|(_, categories)| categories.iter().copied())
        .collect()
}

/// Copy every existing plugin category directory needed by `modules` from
/// `qt_plugins` into `plugins_dir`. Returns the categories copied.
///
/// # Errors
///
/// Returns [`crate::error::DeployError::StagingFailed`] when a copy fails.
pub fn deploy_plugins(
    modules: &BTreeSet<String>,
    qt_plugins: &Utf8Path,
    plugins_dir: &Utf8Path,
) -> Result<Vec<&'static str>> {
    let mut copied = Vec::new();

    for category in plugin_categories(modules) {
        let source = qt_plugins.join(category);
        if !source.is_dir() {
            log::debug!("no {category} plugins in {qt_plugins}");
            continue;
        }

        let target = plugins_dir.join(category);
        log::info!("    {source} -> {target}");
        copy_tree(&source, &target)?;
        copied.push(category);
    }

    Ok(copied)
}
