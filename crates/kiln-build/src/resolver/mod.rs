//! Module resolution.
//!
//! Turns a `require` reference plus the requesting unit into a concrete
//! source file and its output location. Rules, first match wins:
//!
//! 1. `false` stubs the dependency out.
//! 2. Absolute references are used as-is.
//! 3. Relative references join the requesting unit's directory. Inside a
//!    package, the package's self-reference fields may redirect them.
//! 4. Bare package names walk ancestor `node_modules` directories; the found
//!    package's entry file is subject to its own self-reference fields.
//! 5. Deep references (`pkg/sub/path`) resolve inside the package root.
//!
//! Every candidate is then probed with the component extension, `.js`, `.ts`,
//! `index.js` and finally the literal path.

mod manifest;
mod probe;
mod specifier;

pub use manifest::{FsManifestReader, ManifestReader, PackageManifest, Redirect};
pub use probe::{candidates, probe, with_suffix};
pub use specifier::{STUB, Specifier, apply_alias, extract_package_name};

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{BuildError, BuildResult};
use crate::params::BuildParams;
use crate::paths::to_slash;
use crate::unit::{PackageInfo, SourceUnit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Stubbed out: replaced by an empty module.
    Empty,
    File(ResolvedFile),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Owning package when the file must be copied into the npm output tree.
    pub package: Option<PackageInfo>,
}

impl ResolvedFile {
    pub fn needs_copy(&self) -> bool {
        self.package.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    params: Arc<BuildParams>,
    manifests: Arc<dyn ManifestReader>,
}

impl PathResolver {
    pub fn new(params: Arc<BuildParams>, manifests: Arc<dyn ManifestReader>) -> Self {
        Self { params, manifests }
    }

    pub fn params(&self) -> &BuildParams {
        &self.params
    }

    fn fields(&self) -> &[String] {
        &self.params.config.resolve.fields
    }

    /// Apply configured aliases. Relative alias targets are project-root relative.
    fn alias<'a>(&self, reference: &'a str) -> Cow<'a, str> {
        let aliased = apply_alias(reference, &self.params.config.resolve.alias);
        match aliased {
            Cow::Owned(value) if value.starts_with('.') => {
                let absolute = path_clean::clean(self.params.root.join(&value));
                Cow::Owned(absolute.to_string_lossy().into_owned())
            }
            other => other,
        }
    }

    /// Resolve `reference` as required from `from`.
    ///
    /// # Errors
    ///
    /// `ModuleNotFound` carrying the reference and the requesting file when
    /// no candidate exists.
    pub fn resolve(&self, reference: &str, from: &SourceUnit) -> BuildResult<Resolved> {
        let not_found = || BuildError::ModuleNotFound {
            reference: reference.to_string(),
            from: from.path().to_path_buf(),
        };

        let aliased = self.alias(reference);
        let (base, package) = match Specifier::parse(&aliased) {
            Specifier::Stub => return Ok(Resolved::Empty),
            Specifier::Absolute(path) => (PathBuf::from(path), None),
            Specifier::Relative(relative) => {
                let base = path_clean::clean(from.dir().join(relative));
                match from.package() {
                    Some(owner) => match self.redirect_within(owner, &base)? {
                        Some(Redirect::Disabled) => return Ok(Resolved::Empty),
                        Some(Redirect::Path(path)) => {
                            (path_clean::clean(owner.root.join(path)), Some(owner.clone()))
                        }
                        None => (base, Some(owner.clone())),
                    },
                    None => (base, None),
                }
            }
            Specifier::Package(name) => {
                let redirected = match from.package() {
                    Some(owner) => self.redirect_request(owner, name)?,
                    None => None,
                };
                match redirected {
                    Some(Redirect::Disabled) => return Ok(Resolved::Empty),
                    Some(Redirect::Path(path)) if path.starts_with('.') => {
                        let owner = from.package().cloned();
                        let root = owner.as_ref().map(|o| o.root.clone()).unwrap_or_default();
                        (path_clean::clean(root.join(path)), owner)
                    }
                    Some(Redirect::Path(path)) => {
                        match self.package_entry(&path, from.dir())? {
                            Some(found) => found,
                            None => return Err(not_found()),
                        }
                    }
                    None => match self.package_entry(name, from.dir())? {
                        Some(found) => found,
                        None => return Err(not_found()),
                    },
                }
            }
            Specifier::Deep { package, subpath } => {
                let Some((info, manifest)) = self.find_package(package, from.dir())? else {
                    return Err(not_found());
                };
                let sub = match manifest.redirect(subpath, self.fields()) {
                    Some(Redirect::Disabled) => return Ok(Resolved::Empty),
                    Some(Redirect::Path(path)) => path,
                    None => subpath.to_string(),
                };
                (path_clean::clean(info.root.join(sub)), Some(info))
            }
        };

        let source = probe(&base, &self.params.config.component_ext).ok_or_else(not_found)?;
        let target = match &package {
            Some(info) => self.params.npm_output_path(info, &source),
            None => self.params.script_output_path(&source),
        };
        Ok(Resolved::File(ResolvedFile {
            source,
            target,
            package,
        }))
    }

    /// Resolve a bare package name (or a redirected deep path) to its entry file.
    fn package_entry(
        &self,
        reference: &str,
        from_dir: &Path,
    ) -> BuildResult<Option<(PathBuf, Option<PackageInfo>)>> {
        let (name, subpath) = match Specifier::parse(reference) {
            Specifier::Deep { package, subpath } => (package, Some(subpath)),
            _ => (extract_package_name(reference.trim_end_matches('/')), None),
        };
        let Some((info, manifest)) = self.find_package(name, from_dir)? else {
            return Ok(None);
        };
        let file = match subpath {
            Some(subpath) => subpath.to_string(),
            None => {
                let entry = manifest.entry(self.fields());
                match manifest.redirect(&entry, self.fields()) {
                    Some(Redirect::Path(path)) => path,
                    _ => entry,
                }
            }
        };
        Ok(Some((path_clean::clean(info.root.join(file)), Some(info))))
    }

    /// Redirect for a path inside `owner`, through its self-reference fields.
    fn redirect_within(&self, owner: &PackageInfo, base: &Path) -> BuildResult<Option<Redirect>> {
        let Ok(inside) = base.strip_prefix(&owner.root) else {
            return Ok(None);
        };
        self.redirect_request(owner, &to_slash(inside))
    }

    fn redirect_request(&self, owner: &PackageInfo, request: &str) -> BuildResult<Option<Redirect>> {
        let Some(manifest) = self.manifests.read(&owner.root)? else {
            return Ok(None);
        };
        if !manifest.has_self_fields(self.fields()) {
            return Ok(None);
        }
        Ok(manifest.redirect(request, self.fields()))
    }

    /// Find package `name` by walking the ancestors of `from_dir`.
    pub fn find_package(
        &self,
        name: &str,
        from_dir: &Path,
    ) -> BuildResult<Option<(PackageInfo, Arc<PackageManifest>)>> {
        for ancestor in from_dir.ancestors() {
            for modules in &self.params.config.resolve.modules {
                let module_root = if Path::new(modules).is_absolute() {
                    PathBuf::from(modules)
                } else {
                    ancestor.join(modules)
                };
                let root = module_root.join(name);
                if let Some(manifest) = self.manifests.read(&root)? {
                    let info = PackageInfo {
                        name: name.to_string(),
                        root,
                        module_root,
                    };
                    return Ok(Some((info, manifest)));
                }
            }
        }
        Ok(None)
    }

    /// Project file a relative or absolute reference points at, if it exists.
    ///
    /// Used for static import scanning, where package references are not graph edges.
    pub fn locate_local(&self, reference: &str, from_file: &Path) -> Option<PathBuf> {
        let aliased = self.alias(reference);
        let base = match Specifier::parse(&aliased) {
            Specifier::Absolute(path) => PathBuf::from(path),
            Specifier::Relative(relative) => {
                path_clean::clean(from_file.parent()?.join(relative))
            }
            _ => return None,
        };
        probe(&base, &self.params.config.component_ext)
    }
}
