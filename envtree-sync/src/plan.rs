//! Pure planning of environment trees.
//!
//! Nothing here touches the filesystem: every function turns settings, a
//! declaration and element names into an ordered list of [`TreeOp`]s that
//! [`crate::materializer`] applies (or only reports, in dry-run mode).
//!
//! ## Layout of one environment
//!
//! | Element | Link | Target |
//! |---|---|---|
//! | module code | `<env>/modules/<module>` | `<clone>/modules/<module>/<branch>/code` |
//! | module data | `<env>/hieradata/module_names/<module>` | `<clone>/modules/<module>/<branch>/data` |
//! | hostgroup code | `<env>/hostgroups/hg_<hg>` | `<clone>/hostgroups/<hg>/<branch>/code` |
//! | hostgroup data | `<env>/hieradata/hostgroups/<hg>` | `<clone>/hostgroups/<hg>/<branch>/data/hostgroup` |
//! | fqdn data | `<env>/hieradata/fqdns/<hg>` | `<clone>/hostgroups/<hg>/<branch>/data/fqdns` |
//! | site | `<env>/site` | `<clone>/common/site/<branch>/code` |
//! | common data | `<env>/hieradata/<artifact>` | `<clone>/common/hieradata/<branch>/data/<artifact>` |
//!
//! Link targets are stored relative to the link's parent directory so the
//! whole tree can be moved as a unit.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use envtree_core::{
    resolve, settings::DIRECTORY_ENVIRONMENTS_CONF_FILENAME, EnvironmentDeclaration,
    EnvironmentName, Inventory, Partition, RefResolver, Settings,
};

/// Sub-directories of `<env>/hieradata`.
pub const HIERADATA_DIRS: &[&str] = &["module_names", "hostgroups", "fqdns"];

/// Shared Hiera artifacts linked straight into `<env>/hieradata`.
pub const COMMON_HIERADATA_ITEMS: &[&str] =
    &["environments", "hardware", "operatingsystems", "common.yaml"];

/// Contents of `environment.conf` in directory-environment mode.
pub const DIRECTORY_ENVIRONMENT_CONF: &str =
    "modulepath = modules:hostgroups\nmanifest = site/site.pp\n";

const HOSTGROUP_CODE_PREFIX: &str = "hg_";

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// The part of an environment an operation belongs to. Failures are
/// accounted per element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Element {
    /// Root directory and fixed sub-directories.
    Skeleton,
    /// The environment root as a whole (deletion).
    Root,
    Module(String),
    Hostgroup(String),
    Site,
    CommonHieradata,
    Manifest,
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Skeleton => f.write_str("directory skeleton"),
            Element::Root => f.write_str("environment root"),
            Element::Module(name) => write!(f, "module '{name}'"),
            Element::Hostgroup(name) => write!(f, "hostgroup '{name}'"),
            Element::Site => f.write_str("site"),
            Element::CommonHieradata => f.write_str("common hieradata"),
            Element::Manifest => f.write_str("environment.conf"),
        }
    }
}

/// One symlink: `link` pointing at `target`, where `target` is relative
/// to `link`'s parent directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSpec {
    pub link: PathBuf,
    pub target: PathBuf,
}

impl LinkSpec {
    /// Build a spec pointing `link` at `absolute_target`.
    pub fn new(link: PathBuf, absolute_target: &Path) -> Self {
        let parent = absolutize(link.parent().unwrap_or_else(|| Path::new("")));
        let target = relative_path(&parent, &absolutize(absolute_target));
        Self { link, target }
    }

    /// The absolute path the link resolves to.
    pub fn resolved_target(&self) -> PathBuf {
        let parent = self.link.parent().unwrap_or_else(|| Path::new(""));
        absolutize(&parent.join(&self.target))
    }
}

/// A single filesystem mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TreeOp {
    /// Create one directory; fails if it already exists.
    CreateDir { path: PathBuf },
    Symlink(LinkSpec),
    /// Remove a symlink if there is one; anything else is left alone.
    Unlink { path: PathBuf },
    WriteFile { path: PathBuf, contents: String },
    RemoveTree { path: PathBuf },
}

impl fmt::Display for TreeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeOp::CreateDir { path } => write!(f, "mkdir {}", path.display()),
            TreeOp::Symlink(spec) => {
                write!(f, "link {} -> {}", spec.link.display(), spec.target.display())
            }
            TreeOp::Unlink { path } => write!(f, "unlink {}", path.display()),
            TreeOp::WriteFile { path, .. } => write!(f, "write {}", path.display()),
            TreeOp::RemoveTree { path } => write!(f, "rmtree {}", path.display()),
        }
    }
}

/// The operations of one element, applied in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementPlan {
    pub element: Element,
    pub ops: Vec<TreeOp>,
}

impl ElementPlan {
    fn new(element: Element, ops: Vec<TreeOp>) -> Self {
        Self { element, ops }
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Plans tree operations for environments under one set of settings.
#[derive(Clone, Copy)]
pub struct Planner<'a> {
    settings: &'a Settings,
    refs: &'a dyn RefResolver,
}

impl<'a> Planner<'a> {
    pub fn new(settings: &'a Settings, refs: &'a dyn RefResolver) -> Self {
        Self { settings, refs }
    }

    /// Full creation plan: skeleton, selected modules and hostgroups, site,
    /// common hieradata and, when enabled, the manifest.
    pub fn create_environment(
        &self,
        name: &EnvironmentName,
        declaration: &EnvironmentDeclaration,
        inventory: &Inventory,
    ) -> Vec<ElementPlan> {
        let mut plan = vec![ElementPlan::new(Element::Skeleton, self.skeleton(name))];
        for module in declaration.selected_elements(Partition::Modules, &inventory.modules) {
            plan.push(ElementPlan::new(
                Element::Module(module.clone()),
                self.link_module(name, declaration, module),
            ));
        }
        for hostgroup in declaration.selected_elements(Partition::Hostgroups, &inventory.hostgroups)
        {
            plan.push(ElementPlan::new(
                Element::Hostgroup(hostgroup.clone()),
                self.link_hostgroup(name, declaration, hostgroup),
            ));
        }
        plan.push(ElementPlan::new(Element::Site, self.link_site(name, declaration)));
        plan.push(ElementPlan::new(
            Element::CommonHieradata,
            self.link_common_hieradata(name, declaration),
        ));
        if self.settings.directory_environments {
            plan.push(ElementPlan::new(Element::Manifest, self.manifest(name)));
        }
        plan
    }

    /// `<env>`, `<env>/{modules,hostgroups,hieradata}`, `<env>/hieradata/{module_names,hostgroups,fqdns}`.
    pub fn skeleton(&self, name: &EnvironmentName) -> Vec<TreeOp> {
        let root = self.settings.environment_root(name);
        let mut dirs = vec![root.clone()];
        dirs.extend(["modules", "hostgroups", "hieradata"].map(|d| root.join(d)));
        dirs.extend(HIERADATA_DIRS.iter().map(|d| root.join("hieradata").join(d)));
        dirs.into_iter()
            .map(|path| TreeOp::CreateDir { path })
            .collect()
    }

    pub fn delete_environment(&self, name: &EnvironmentName) -> Vec<TreeOp> {
        vec![TreeOp::RemoveTree {
            path: self.settings.environment_root(name),
        }]
    }

    pub fn link_module(
        &self,
        name: &EnvironmentName,
        declaration: &EnvironmentDeclaration,
        module: &str,
    ) -> Vec<TreeOp> {
        let branch = resolve(declaration, Partition::Modules, module, self.refs);
        tracing::debug!(
            "adding module '{module}' ({}) to environment '{name}'",
            branch.dirname
        );
        let checkout = self.checkout("modules", module, &branch.dirname);
        self.module_link_paths(name, module)
            .into_iter()
            .zip([checkout.join("code"), checkout.join("data")])
            .map(|(link, target)| TreeOp::Symlink(LinkSpec::new(link, &target)))
            .collect()
    }

    pub fn unlink_module(&self, name: &EnvironmentName, module: &str) -> Vec<TreeOp> {
        self.module_link_paths(name, module)
            .into_iter()
            .map(|path| TreeOp::Unlink { path })
            .collect()
    }

    pub fn link_hostgroup(
        &self,
        name: &EnvironmentName,
        declaration: &EnvironmentDeclaration,
        hostgroup: &str,
    ) -> Vec<TreeOp> {
        let branch = resolve(declaration, Partition::Hostgroups, hostgroup, self.refs);
        tracing::debug!(
            "adding hostgroup '{hostgroup}' ({}) to environment '{name}'",
            branch.dirname
        );
        let checkout = self.checkout("hostgroups", hostgroup, &branch.dirname);
        let data = checkout.join("data");
        self.hostgroup_link_paths(name, hostgroup)
            .into_iter()
            .zip([checkout.join("code"), data.join("hostgroup"), data.join("fqdns")])
            .map(|(link, target)| TreeOp::Symlink(LinkSpec::new(link, &target)))
            .collect()
    }

    pub fn unlink_hostgroup(&self, name: &EnvironmentName, hostgroup: &str) -> Vec<TreeOp> {
        self.hostgroup_link_paths(name, hostgroup)
            .into_iter()
            .map(|path| TreeOp::Unlink { path })
            .collect()
    }

    pub fn link_site(
        &self,
        name: &EnvironmentName,
        declaration: &EnvironmentDeclaration,
    ) -> Vec<TreeOp> {
        let branch = resolve(declaration, Partition::Common, "site", self.refs);
        let target = self.checkout("common", "site", &branch.dirname).join("code");
        let link = self.settings.environment_root(name).join("site");
        vec![TreeOp::Symlink(LinkSpec::new(link, &target))]
    }

    pub fn link_common_hieradata(
        &self,
        name: &EnvironmentName,
        declaration: &EnvironmentDeclaration,
    ) -> Vec<TreeOp> {
        let branch = resolve(declaration, Partition::Common, "hieradata", self.refs);
        let base_target = self.checkout("common", "hieradata", &branch.dirname).join("data");
        let base_link = self.settings.environment_root(name).join("hieradata");
        COMMON_HIERADATA_ITEMS
            .iter()
            .map(|item| {
                TreeOp::Symlink(LinkSpec::new(base_link.join(item), &base_target.join(item)))
            })
            .collect()
    }

    pub fn manifest(&self, name: &EnvironmentName) -> Vec<TreeOp> {
        vec![TreeOp::WriteFile {
            path: self
                .settings
                .environment_root(name)
                .join(DIRECTORY_ENVIRONMENTS_CONF_FILENAME),
            contents: DIRECTORY_ENVIRONMENT_CONF.to_string(),
        }]
    }

    /// `<clone>/<partition>/<element>/<branch>`
    fn checkout(&self, partition: &str, element: &str, branch_dir: &str) -> PathBuf {
        self.settings
            .clone_dir
            .join(partition)
            .join(element)
            .join(branch_dir)
    }

    fn module_link_paths(&self, name: &EnvironmentName, module: &str) -> [PathBuf; 2] {
        let root = self.settings.environment_root(name);
        [
            root.join("modules").join(module),
            root.join("hieradata").join("module_names").join(module),
        ]
    }

    fn hostgroup_link_paths(&self, name: &EnvironmentName, hostgroup: &str) -> [PathBuf; 3] {
        let root = self.settings.environment_root(name);
        [
            root.join("hostgroups")
                .join(format!("{HOSTGROUP_CODE_PREFIX}{hostgroup}")),
            root.join("hieradata").join("hostgroups").join(hostgroup),
            root.join("hieradata").join("fqdns").join(hostgroup),
        ]
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Make `path` absolute against the working directory and fold `.`/`..`
/// lexically. Symlinks are not followed.
pub fn absolutize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Path of `to` relative to the directory `from`. Both must be absolute
/// and normalized.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();
    let common = from
        .iter()
        .zip(&to)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for component in &to[common..] {
        relative.push(component.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

#[cfg(test)]
mod tests {
    use super::*;
    use envtree_core::{Overrides, RefDirnames};

    fn declaration(default: Option<&str>, modules: &[(&str, &str)]) -> EnvironmentDeclaration {
        EnvironmentDeclaration {
            name: EnvironmentName::from("prod"),
            default: default.map(str::to_owned),
            overrides: Some(Overrides {
                modules: Some(
                    modules
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Overrides::default()
            }),
            notifications: serde_yaml::Value::Null,
        }
    }

    fn inventory(modules: &[&str], hostgroups: &[&str]) -> Inventory {
        Inventory {
            modules: modules.iter().map(|s| s.to_string()).collect(),
            hostgroups: hostgroups.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn links(ops: &[TreeOp]) -> Vec<&LinkSpec> {
        ops.iter()
            .filter_map(|op| match op {
                TreeOp::Symlink(spec) => Some(spec),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn relative_path_walks_up_to_common_ancestor() {
        assert_eq!(
            relative_path(
                Path::new("/a/env/prod/modules"),
                Path::new("/a/clone/modules/x/master/code")
            ),
            PathBuf::from("../../../clone/modules/x/master/code")
        );
        assert_eq!(relative_path(Path::new("/a/b"), Path::new("/a/b")), PathBuf::from("."));
    }

    #[test]
    fn absolutize_folds_parent_components() {
        assert_eq!(absolutize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
    }

    #[test]
    fn module_links_follow_layout() {
        let settings = Settings::rooted_at(Path::new("/srv"));
        let planner = Planner::new(&settings, &RefDirnames);
        let decl = declaration(Some("master"), &[]);
        let ops = planner.link_module(&EnvironmentName::from("prod"), &decl, "apache");
        let specs = links(&ops);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].link, PathBuf::from("/srv/environments/prod/modules/apache"));
        assert_eq!(
            specs[0].target,
            PathBuf::from("../../../clone/modules/apache/master/code")
        );
        assert_eq!(
            specs[1].resolved_target(),
            PathBuf::from("/srv/clone/modules/apache/master/data")
        );
    }

    #[test]
    fn hostgroup_links_follow_layout() {
        let settings = Settings::rooted_at(Path::new("/srv"));
        let planner = Planner::new(&settings, &RefDirnames);
        let decl = declaration(Some("qa"), &[]);
        let ops = planner.link_hostgroup(&EnvironmentName::from("prod"), &decl, "aimon");
        let resolved: Vec<_> = links(&ops)
            .iter()
            .map(|s| (s.link.clone(), s.resolved_target()))
            .collect();
        assert_eq!(
            resolved,
            vec![
                (
                    PathBuf::from("/srv/environments/prod/hostgroups/hg_aimon"),
                    PathBuf::from("/srv/clone/hostgroups/aimon/qa/code")
                ),
                (
                    PathBuf::from("/srv/environments/prod/hieradata/hostgroups/aimon"),
                    PathBuf::from("/srv/clone/hostgroups/aimon/qa/data/hostgroup")
                ),
                (
                    PathBuf::from("/srv/environments/prod/hieradata/fqdns/aimon"),
                    PathBuf::from("/srv/clone/hostgroups/aimon/qa/data/fqdns")
                ),
            ]
        );
    }

    #[test]
    fn links_are_relocatable_for_any_prefix() {
        for prefix in ["/", "/srv", "/very/deep/prefix/of/things"] {
            let settings = Settings::rooted_at(Path::new(prefix));
            let planner = Planner::new(&settings, &RefDirnames);
            let decl = declaration(Some("master"), &[]);
            let plan = planner.create_environment(
                &EnvironmentName::from("prod"),
                &decl,
                &inventory(&["apache"], &["aimon"]),
            );
            for element in &plan {
                for spec in links(&element.ops) {
                    assert!(spec.target.is_relative(), "{prefix}: {:?}", spec.target);
                    assert!(
                        spec.resolved_target().starts_with(absolutize(&settings.clone_dir)),
                        "{prefix}: {:?} escapes the clone root",
                        spec.resolved_target()
                    );
                }
            }
        }
    }

    #[test]
    fn opt_in_environment_links_only_overridden_modules() {
        let settings = Settings::rooted_at(Path::new("/srv"));
        let planner = Planner::new(&settings, &RefDirnames);
        let decl = declaration(None, &[("m1", "rel-2")]);
        let plan = planner.create_environment(
            &EnvironmentName::from("e"),
            &decl,
            &inventory(&["m1", "m2"], &["hg1"]),
        );
        let elements: Vec<_> = plan.iter().map(|p| p.element.clone()).collect();
        assert_eq!(
            elements,
            vec![
                Element::Skeleton,
                Element::Module("m1".to_string()),
                Element::Site,
                Element::CommonHieradata,
            ]
        );
        let m1 = links(&plan[1].ops);
        assert_eq!(
            m1[0].resolved_target(),
            PathBuf::from("/srv/clone/modules/m1/rel-2/code")
        );
        // Common elements fall back to master without a default.
        assert_eq!(
            links(&plan[2].ops)[0].resolved_target(),
            PathBuf::from("/srv/clone/common/site/master/code")
        );
    }

    #[test]
    fn skeleton_and_manifest() {
        let mut settings = Settings::rooted_at(Path::new("/srv"));
        settings.directory_environments = true;
        let planner = Planner::new(&settings, &RefDirnames);
        let plan = planner.create_environment(
            &EnvironmentName::from("prod"),
            &declaration(Some("master"), &[]),
            &Inventory::default(),
        );
        assert_eq!(plan[0].ops.len(), 7);
        assert_eq!(
            plan[0].ops[0],
            TreeOp::CreateDir {
                path: PathBuf::from("/srv/environments/prod")
            }
        );
        let manifest = plan.last().unwrap();
        assert_eq!(manifest.element, Element::Manifest);
        assert_eq!(
            manifest.ops,
            vec![TreeOp::WriteFile {
                path: PathBuf::from("/srv/environments/prod/environment.conf"),
                contents: "modulepath = modules:hostgroups\nmanifest = site/site.pp\n".to_string(),
            }]
        );
    }

    #[test]
    fn common_hieradata_links_four_artifacts() {
        let settings = Settings::rooted_at(Path::new("/srv"));
        let planner = Planner::new(&settings, &RefDirnames);
        let ops = planner.link_common_hieradata(
            &EnvironmentName::from("prod"),
            &declaration(Some("qa"), &[]),
        );
        let targets: Vec<_> = links(&ops).iter().map(|s| s.resolved_target()).collect();
        assert_eq!(targets.len(), 4);
        assert_eq!(
            targets[3],
            PathBuf::from("/srv/clone/common/hieradata/qa/data/common.yaml")
        );
    }
}
