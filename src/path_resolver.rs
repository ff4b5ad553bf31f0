// Licensed under the MIT License.

//! The Path Resolver (§4.2): selects the reference checkout and builds a
//! bidirectional mapping between reference-file paths and per-locale
//! target paths.
//!
//! `PathResolver` itself is the narrow external-collaborator capability
//! of §6 (one tree-layout convention among many a real deployment might
//! use); the *selection* of which resolver flavor to build and which
//! checkout is the reference is core logic and lives in [`get_paths`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::checkout::Checkout;
use crate::errors::{Error, Result};
use crate::models::Project;

/// Locale-code ↔ directory-name conversion requested by a resolver's
/// configuration. `AndroidLocale` matches Android's `values-xx-rYY`
/// convention; `Code` uses the locale code verbatim as the directory
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocaleDirStyle {
    Code,
    AndroidLocale,
}

impl LocaleDirStyle {
    fn dir_for(self, locale_code: &str) -> String {
        match self {
            LocaleDirStyle::Code => locale_code.to_string(),
            LocaleDirStyle::AndroidLocale => to_android_locale(locale_code),
        }
    }

    fn code_for(self, dir_name: &str) -> String {
        match self {
            LocaleDirStyle::Code => dir_name.to_string(),
            LocaleDirStyle::AndroidLocale => parse_android_locale(dir_name),
        }
    }

    fn var_name(self) -> &'static str {
        match self {
            LocaleDirStyle::Code => "locale",
            LocaleDirStyle::AndroidLocale => "android_locale",
        }
    }
}

/// `en-US` → `en-rUS` and friends (Android resource qualifier form).
pub fn to_android_locale(code: &str) -> String {
    match code.split_once('-') {
        Some((lang, region)) => format!("{lang}-r{}", region.to_uppercase()),
        None => code.to_string(),
    }
}

/// The inverse of [`to_android_locale`].
pub fn parse_android_locale(dir: &str) -> String {
    match dir.split_once("-r") {
        Some((lang, region)) => format!("{lang}-{}", region.to_uppercase()),
        None => dir.to_string(),
    }
}

/// A path-mapping capability: given a reference path, produce the target
/// path for a locale (and vice versa).
pub trait PathResolver {
    /// Root of reference files, relative to which `Resource.path` values
    /// are expressed.
    fn ref_root(&self) -> &Path;

    /// Root of target files (parent of the per-locale trees), when known.
    fn base(&self) -> Option<&Path>;

    fn locales(&self) -> &[String];

    fn set_locales(&mut self, locales: Vec<String>);

    /// The on-disk path a `refPath` would have for `localeCode`, or
    /// `None` if this resolver cannot place that locale.
    fn target_path(&self, ref_path: &str, locale_code: &str) -> Option<PathBuf>;

    /// Every locale this resolver can produce a target path for, given a
    /// reference path.
    fn target_locales(&self, ref_path: &str) -> Vec<String>;

    /// Recover `(refPath, pathVars)` from an absolute target path, or
    /// `None` if it does not fall under this resolver's target tree.
    fn find_reference(&self, abs_target_path: &Path) -> Option<(String, HashMap<String, String>)>;
}

/// Shared mirrored-tree mechanics: a target path for locale `L` is the
/// reference path with its locale-directory component set to
/// `style.dir_for(L)`, rooted under `base`.
struct MirroredTree {
    ref_root: PathBuf,
    base: Option<PathBuf>,
    locales: Vec<String>,
    style: LocaleDirStyle,
    /// Directory under `base` holding the per-locale subtrees (e.g.
    /// `"locale"`), empty when locale directories sit directly under
    /// `base`.
    locale_dir: String,
}

impl MirroredTree {
    fn rooted_base(&self) -> Option<PathBuf> {
        let base = self.base.as_ref()?;
        if self.locale_dir.is_empty() {
            Some(base.clone())
        } else {
            Some(base.join(&self.locale_dir))
        }
    }

    fn target_path(&self, ref_path: &str, locale_code: &str) -> Option<PathBuf> {
        let base = self.rooted_base()?;
        Some(base.join(self.style.dir_for(locale_code)).join(ref_path))
    }

    fn find_reference(&self, abs_target_path: &Path) -> Option<(String, HashMap<String, String>)> {
        let base = self.rooted_base()?;
        let rel = abs_target_path.strip_prefix(&base).ok()?;
        let mut components = rel.components();
        let locale_dir = components.next()?.as_os_str().to_str()?;
        let ref_path: PathBuf = components.collect();
        let mut vars = HashMap::new();
        vars.insert(
            self.style.var_name().to_string(),
            self.style.code_for(locale_dir),
        );
        Some((ref_path.to_string_lossy().into_owned(), vars))
    }
}

/// A resolver driven by an explicit per-project configuration file
/// (§4.2, `L10nConfigPaths` in spirit).
pub struct ConfigPathResolver {
    tree: MirroredTree,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default = "default_locale_dir")]
    locale_dir: String,
    #[serde(default)]
    locale_style: LocaleStyleConfig,
}

fn default_locale_dir() -> String {
    "locale".to_string()
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum LocaleStyleConfig {
    #[default]
    Code,
    AndroidLocale,
}

impl ConfigPathResolver {
    /// Parse `config_path` (a TOML file rooted in the reference
    /// checkout) and build a resolver. `base` defaults to the reference
    /// checkout's root's parent and is rebased by [`get_paths`] when a
    /// distinct target repository is configured.
    pub fn load(config_path: &Path, ref_root: PathBuf, base: PathBuf) -> Result<Self> {
        let text = std::fs::read_to_string(config_path)?;
        let parsed: ConfigFile = toml::from_str(&text).map_err(|source| Error::Configuration {
            path: config_path.to_string_lossy().into_owned(),
            source,
        })?;
        let style = match parsed.locale_style {
            LocaleStyleConfig::Code => LocaleDirStyle::Code,
            LocaleStyleConfig::AndroidLocale => LocaleDirStyle::AndroidLocale,
        };
        Ok(ConfigPathResolver {
            tree: MirroredTree {
                ref_root,
                base: Some(base),
                locales: Vec::new(),
                style,
                locale_dir: parsed.locale_dir,
            },
        })
    }

    pub fn rebase(&mut self, base: PathBuf) {
        self.tree.base = Some(base);
    }
}

impl PathResolver for ConfigPathResolver {
    fn ref_root(&self) -> &Path {
        &self.tree.ref_root
    }

    fn base(&self) -> Option<&Path> {
        self.tree.base.as_deref()
    }

    fn locales(&self) -> &[String] {
        &self.tree.locales
    }

    fn set_locales(&mut self, locales: Vec<String>) {
        self.tree.locales = locales;
    }

    fn target_path(&self, ref_path: &str, locale_code: &str) -> Option<PathBuf> {
        self.tree.target_path(ref_path, locale_code)
    }

    fn target_locales(&self, _ref_path: &str) -> Vec<String> {
        self.tree.locales.clone()
    }

    fn find_reference(&self, abs_target_path: &Path) -> Option<(String, HashMap<String, String>)> {
        self.tree.find_reference(abs_target_path)
    }
}

/// A resolver that infers the reference/target split from directory
/// structure alone (§4.2, `L10nDiscoverPaths` in spirit): one
/// subdirectory of `base` per locale, named after the locale code.
pub struct DiscoverPathResolver {
    tree: MirroredTree,
}

impl DiscoverPathResolver {
    /// Attempt to discover a mirrored-locale layout under `root`.
    /// `preferred_ref_dir`, when given, names the subdirectory of `root`
    /// to treat as the reference tree (typically the source checkout's
    /// own directory name under `root`). Returns `None` when no
    /// reference subdirectory can be identified at all.
    pub fn discover(
        root: &Path,
        preferred_ref_dir: Option<&str>,
        known_locales: &[String],
    ) -> Option<Self> {
        let entries: Vec<String> = std::fs::read_dir(root)
            .ok()?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
            .filter(|name| !name.starts_with('.'))
            .collect();

        let ref_dir = preferred_ref_dir
            .filter(|d| entries.iter().any(|e| e == d))
            .map(|d| d.to_string())
            .or_else(|| entries.iter().find(|e| !known_locales.contains(e)).cloned())?;

        let locales: Vec<String> = entries
            .iter()
            .filter(|e| *e != &ref_dir)
            .filter(|e| known_locales.is_empty() || known_locales.contains(e))
            .cloned()
            .collect();

        debug!("discovered reference directory `{ref_dir}` under {root:?}");

        Some(DiscoverPathResolver {
            tree: MirroredTree {
                ref_root: root.join(&ref_dir),
                base: Some(root.to_path_buf()),
                locales,
                style: LocaleDirStyle::Code,
                locale_dir: String::new(),
            },
        })
    }
}

impl PathResolver for DiscoverPathResolver {
    fn ref_root(&self) -> &Path {
        &self.tree.ref_root
    }

    fn base(&self) -> Option<&Path> {
        self.tree.base.as_deref()
    }

    fn locales(&self) -> &[String] {
        &self.tree.locales
    }

    fn set_locales(&mut self, locales: Vec<String>) {
        self.tree.locales = locales;
    }

    fn target_path(&self, ref_path: &str, locale_code: &str) -> Option<PathBuf> {
        self.tree.target_path(ref_path, locale_code)
    }

    fn target_locales(&self, _ref_path: &str) -> Vec<String> {
        self.tree.locales.clone()
    }

    fn find_reference(&self, abs_target_path: &Path) -> Option<(String, HashMap<String, String>)> {
        self.tree.find_reference(abs_target_path)
    }
}

/// The result of path-resolver selection: the resolver itself, plus the
/// checkout chosen as reference.
pub struct ResolvedPaths {
    pub resolver: Box<dyn PathResolver>,
    pub ref_checkout: Checkout,
}

/// Implements the selection rules of §4.2.
pub fn get_paths(project: &Project, checkouts: &[Checkout]) -> Result<ResolvedPaths> {
    let locale_codes: Vec<String> = checkouts
        .iter()
        .filter_map(|c| c.locale_code.clone())
        .collect();

    let explicit_ref = checkouts.iter().find(|c| c.is_source).cloned();

    if let Some(config_file) = &project.configuration_file {
        let ref_checkout = match explicit_ref {
            Some(c) => c,
            None => {
                let single_locale: Vec<&Checkout> =
                    checkouts.iter().filter(|c| c.locale_code.is_none()).collect();
                if single_locale.len() != 1 {
                    return Err(Error::MissingSourceDirectory(project.slug.clone()));
                }
                single_locale[0].clone()
            }
        };

        let config_path = ref_checkout.path.join(config_file);
        let mut resolver = ConfigPathResolver::load(
            &config_path,
            ref_checkout.path.clone(),
            ref_checkout.repo_checkout_path.clone(),
        )?;

        if checkouts.len() > 1 {
            let targets: Vec<&Checkout> = checkouts
                .iter()
                .filter(|c| c.repository_id != ref_checkout.repository_id)
                .collect();
            let distinct_repos: std::collections::HashSet<_> =
                targets.iter().map(|c| c.repository_id).collect();
            if distinct_repos.len() != 1 {
                return Err(Error::MissingLocaleDirectory(project.slug.clone()));
            }
            resolver.rebase(targets[0].repo_checkout_path.clone());
        }

        resolver.set_locales(locale_codes);
        Ok(ResolvedPaths {
            resolver: Box::new(resolver),
            ref_checkout,
        })
    } else {
        let preferred_ref_dir = explicit_ref
            .as_ref()
            .and_then(|c| c.path.file_name())
            .and_then(|n| n.to_str());

        let mut resolver =
            DiscoverPathResolver::discover(Path::new(&project.checkout_path), preferred_ref_dir, &locale_codes)
                .ok_or_else(|| Error::MissingLocaleDirectory(project.slug.clone()))?;

        let ref_checkout = match explicit_ref {
            Some(c) => c,
            None => checkouts
                .iter()
                .find(|c| resolver.ref_root().starts_with(&c.path))
                .cloned()
                .ok_or_else(|| Error::MissingLocaleDirectory(project.slug.clone()))?,
        };

        resolver.set_locales(locale_codes);
        Ok(ResolvedPaths {
            resolver: Box::new(resolver),
            ref_checkout,
        })
    }
}
