//! Placeholder expansion for command and description templates.
//!
//! Templates reference fixture paths and counts with `{key}` tokens. The key
//! set is closed (see [`Placeholder::ALL`]); tokens outside it are left in
//! place verbatim. Expansion is a single left-to-right scan that only
//! replaces whole `{key}` tokens, so a key never matches inside a longer
//! one and substituted values are never re-expanded.
//!
//! Library-file placeholders are relative to the fixture root, which is the
//! working directory of every tool invocation.

use crate::config::FixtureParams;
use std::path::{Path, PathBuf};

const GLOBAL_LIB_FILE: &str = "lib/global/main.libsonnet";
const MAIN_FILE: &str = "main.jsonnet";

/// Every recognised placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    FixturesDir,
    SingleStaticDir,
    SingleInlineDir,
    SingleInlineFile,
    SingleStaticMainFile,
    GlobalLibFile,
    SingleEnvLibFile,
    AllStaticEnvPaths,
    AllInlineFilePaths,
    AllStaticMainFiles,
    AllStaticMainFilesRel,
    AllInlineFilesRel,
    AllEnvLibFiles,
    AllLibFiles,
    AllJsonnetFiles,
    StaticEnvs,
    InlineFiles,
    EnvsPerInlineFile,
    ResourcesPerEnv,
    TotalEnvLibs,
    TotalLibFiles,
    TotalEnvs,
    ExportDir,
}

impl Placeholder {
    pub const ALL: [Self; 23] = [
        Self::FixturesDir,
        Self::SingleStaticDir,
        Self::SingleInlineDir,
        Self::SingleInlineFile,
        Self::SingleStaticMainFile,
        Self::GlobalLibFile,
        Self::SingleEnvLibFile,
        Self::AllStaticEnvPaths,
        Self::AllInlineFilePaths,
        Self::AllStaticMainFiles,
        Self::AllStaticMainFilesRel,
        Self::AllInlineFilesRel,
        Self::AllEnvLibFiles,
        Self::AllLibFiles,
        Self::AllJsonnetFiles,
        Self::StaticEnvs,
        Self::InlineFiles,
        Self::EnvsPerInlineFile,
        Self::ResourcesPerEnv,
        Self::TotalEnvLibs,
        Self::TotalLibFiles,
        Self::TotalEnvs,
        Self::ExportDir,
    ];

    /// The name used inside braces.
    pub fn key(self) -> &'static str {
        match self {
            Self::FixturesDir => "fixtures_dir",
            Self::SingleStaticDir => "single_static_dir",
            Self::SingleInlineDir => "single_inline_dir",
            Self::SingleInlineFile => "single_inline_file",
            Self::SingleStaticMainFile => "single_static_main_file",
            Self::GlobalLibFile => "global_lib_file",
            Self::SingleEnvLibFile => "single_env_lib_file",
            Self::AllStaticEnvPaths => "all_static_env_paths",
            Self::AllInlineFilePaths => "all_inline_file_paths",
            Self::AllStaticMainFiles => "all_static_main_files",
            Self::AllStaticMainFilesRel => "all_static_main_files_rel",
            Self::AllInlineFilesRel => "all_inline_files_rel",
            Self::AllEnvLibFiles => "all_env_lib_files",
            Self::AllLibFiles => "all_lib_files",
            Self::AllJsonnetFiles => "all_jsonnet_files",
            Self::StaticEnvs => "static_envs",
            Self::InlineFiles => "inline_files",
            Self::EnvsPerInlineFile => "envs_per_inline_file",
            Self::ResourcesPerEnv => "resources_per_env",
            Self::TotalEnvLibs => "total_env_libs",
            Self::TotalLibFiles => "total_lib_files",
            Self::TotalEnvs => "total_envs",
            Self::ExportDir => "export_dir",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }
}

impl std::fmt::Display for Placeholder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.key())
    }
}

/// Resolves placeholders against a fixture tree.
#[derive(Debug, Clone)]
pub struct PathVars {
    root: PathBuf,
    params: Option<FixtureParams>,
}

impl PathVars {
    /// Variables for a generated fixture tree.
    pub fn new(root: impl Into<PathBuf>, params: FixtureParams) -> Self {
        Self {
            root: root.into(),
            params: Some(params),
        }
    }

    /// Variables for a tree without parameters: only `{fixtures_dir}` and
    /// `{export_dir}` resolve.
    pub fn root_only(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            params: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn abs(&self, rel: impl AsRef<Path>) -> String {
        self.root.join(rel).display().to_string()
    }

    /// Resolve one placeholder. `ExportDir` resolves only when `export_dir` is given.
    pub fn resolve(&self, placeholder: Placeholder, export_dir: Option<&Path>) -> Option<String> {
        // Everything but the root and export dir needs fixture parameters.
        let value = match placeholder {
            Placeholder::FixturesDir => self.root.display().to_string(),
            Placeholder::ExportDir => export_dir?.display().to_string(),
            Placeholder::SingleStaticDir => {
                self.params?;
                self.abs(static_dir(1))
            }
            Placeholder::SingleInlineDir => {
                self.params?;
                self.abs(inline_dir(1))
            }
            Placeholder::SingleInlineFile => {
                self.params?;
                self.abs(Path::new(&inline_dir(1)).join(MAIN_FILE))
            }
            Placeholder::SingleStaticMainFile => {
                self.params?;
                self.abs(Path::new(&static_dir(1)).join(MAIN_FILE))
            }
            Placeholder::GlobalLibFile => {
                self.params?;
                GLOBAL_LIB_FILE.to_string()
            }
            Placeholder::SingleEnvLibFile => {
                self.params?;
                static_lib_file(1)
            }
            Placeholder::AllStaticEnvPaths => {
                let p = self.params?;
                join((1..=p.static_envs).map(|i| self.abs(static_dir(i))))
            }
            Placeholder::AllInlineFilePaths => {
                let p = self.params?;
                join((1..=p.inline_files).map(|i| self.abs(Path::new(&inline_dir(i)).join(MAIN_FILE))))
            }
            Placeholder::AllStaticMainFiles => {
                let p = self.params?;
                join((1..=p.static_envs).map(|i| self.abs(Path::new(&static_dir(i)).join(MAIN_FILE))))
            }
            Placeholder::AllStaticMainFilesRel => static_main_files_rel(&self.params?),
            Placeholder::AllInlineFilesRel => inline_files_rel(&self.params?),
            Placeholder::AllEnvLibFiles => env_lib_files(&self.params?),
            Placeholder::AllLibFiles => all_lib_files(&self.params?),
            Placeholder::AllJsonnetFiles => {
                let p = self.params?;
                join(
                    [static_main_files_rel(&p), inline_files_rel(&p), all_lib_files(&p)]
                        .into_iter()
                        .filter(|part| !part.is_empty()),
                )
            }
            Placeholder::StaticEnvs => self.params?.static_envs.to_string(),
            Placeholder::InlineFiles => self.params?.inline_files.to_string(),
            Placeholder::EnvsPerInlineFile => self.params?.envs_per_inline_file.to_string(),
            Placeholder::ResourcesPerEnv => self.params?.resources_per_env.to_string(),
            Placeholder::TotalEnvLibs => self.params?.total_env_libs().to_string(),
            Placeholder::TotalLibFiles => self.params?.total_lib_files().to_string(),
            Placeholder::TotalEnvs => self.params?.total_envs().to_string(),
        };
        Some(value)
    }

    /// Expand every resolvable placeholder in `template`.
    pub fn expand(&self, template: &str, export_dir: Option<&Path>) -> String {
        scan(template, |key, _| {
            Placeholder::from_key(key).and_then(|p| self.resolve(p, export_dir))
        })
    }
}

fn static_dir(i: u32) -> String {
    format!("static-{i:04}")
}

fn inline_dir(i: u32) -> String {
    format!("inline-{i:02}")
}

fn static_lib_file(i: u32) -> String {
    format!("lib/env-static-{i:04}/main.libsonnet")
}

fn inline_lib_file(i: u32) -> String {
    format!("lib/env-inline-{i:02}/main.libsonnet")
}

fn static_main_files_rel(p: &FixtureParams) -> String {
    join((1..=p.static_envs).map(|i| format!("{}/{MAIN_FILE}", static_dir(i))))
}

fn inline_files_rel(p: &FixtureParams) -> String {
    join((1..=p.inline_files).map(|i| format!("{}/{MAIN_FILE}", inline_dir(i))))
}

fn env_lib_files(p: &FixtureParams) -> String {
    join(
        (1..=p.static_envs)
            .map(static_lib_file)
            .chain((1..=p.inline_files).map(inline_lib_file)),
    )
}

fn all_lib_files(p: &FixtureParams) -> String {
    let env_libs = env_lib_files(p);
    if env_libs.is_empty() {
        GLOBAL_LIB_FILE.to_string()
    } else {
        format!("{GLOBAL_LIB_FILE} {env_libs}")
    }
}

fn join(items: impl IntoIterator<Item = String>) -> String {
    items.into_iter().collect::<Vec<_>>().join(" ")
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Walk `template`, replacing each `{key}` token for which `lookup` returns a value.
///
/// `lookup` also learns whether the token directly follows a `$`.
fn scan(template: &str, mut lookup: impl FnMut(&str, bool) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut prev: Option<char> = None;

    while let Some(open) = rest.find('{') {
        let (before, after_open) = rest.split_at(open);
        out.push_str(before);
        let preceding = before.chars().next_back().or(prev);

        let body = &after_open[1..];
        let key_len = body.find(|c: char| !is_key_char(c)).unwrap_or(body.len());
        let closes = body[key_len..].starts_with('}');

        if key_len > 0 && closes {
            let key = &body[..key_len];
            match lookup(key, preceding == Some('$')) {
                Some(value) => out.push_str(&value),
                None => {
                    out.push('{');
                    out.push_str(key);
                    out.push('}');
                }
            }
            rest = &body[key_len + 1..];
            prev = Some('}');
        } else {
            out.push('{');
            rest = body;
            prev = Some('{');
        }
    }
    out.push_str(rest);
    out
}

/// Tokens in `template` that are not part of the closed key set.
///
/// `${VAR}` shell expansions are not reported.
pub fn unknown_tokens(template: &str) -> Vec<String> {
    let mut unknown = Vec::new();
    scan(template, |key, shell_var| {
        if !shell_var && Placeholder::from_key(key).is_none() {
            unknown.push(format!("{{{key}}}"));
        }
        None
    });
    unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(static_envs: u32, inline_files: u32) -> FixtureParams {
        FixtureParams {
            static_envs,
            inline_files,
            envs_per_inline_file: 3,
            resources_per_env: 1,
        }
    }

    #[test]
    fn test_single_paths() {
        let vars = PathVars::new("/tmp/fx", params(2, 1));
        assert_eq!(
            vars.expand("eval {single_static_main_file}", None),
            "eval /tmp/fx/static-0001/main.jsonnet"
        );
        assert_eq!(vars.expand("{single_inline_dir}", None), "/tmp/fx/inline-01");
        assert_eq!(vars.expand("{single_inline_file}", None), "/tmp/fx/inline-01/main.jsonnet");
        assert_eq!(vars.expand("{global_lib_file}", None), "lib/global/main.libsonnet");
        assert_eq!(
            vars.expand("{single_env_lib_file}", None),
            "lib/env-static-0001/main.libsonnet"
        );
    }

    #[test]
    fn test_lists() {
        let vars = PathVars::new("/f", params(2, 1));
        assert_eq!(
            vars.expand("{all_static_env_paths}", None),
            "/f/static-0001 /f/static-0002"
        );
        assert_eq!(vars.expand("{all_inline_file_paths}", None), "/f/inline-01/main.jsonnet");
        assert_eq!(
            vars.expand("{all_env_lib_files}", None),
            "lib/env-static-0001/main.libsonnet lib/env-static-0002/main.libsonnet lib/env-inline-01/main.libsonnet"
        );
        assert_eq!(
            vars.expand("{all_jsonnet_files}", None),
            "static-0001/main.jsonnet static-0002/main.jsonnet inline-01/main.jsonnet \
             lib/global/main.libsonnet lib/env-static-0001/main.libsonnet \
             lib/env-static-0002/main.libsonnet lib/env-inline-01/main.libsonnet"
        );
    }

    #[test]
    fn test_empty_lists_have_no_stray_spaces() {
        let vars = PathVars::new("/f", params(0, 0));
        assert_eq!(vars.expand("[{all_static_env_paths}]", None), "[]");
        assert_eq!(vars.expand("{all_lib_files}", None), "lib/global/main.libsonnet");
        assert_eq!(vars.expand("{all_jsonnet_files}", None), "lib/global/main.libsonnet");
    }

    #[test]
    fn test_counts() {
        let vars = PathVars::new("/f", params(4, 2));
        assert_eq!(
            vars.expand("{static_envs} {inline_files} {envs_per_inline_file} {resources_per_env}", None),
            "4 2 3 1"
        );
        assert_eq!(vars.expand("{total_envs} {total_env_libs} {total_lib_files}", None), "10 6 7");
    }

    #[test]
    fn test_export_dir_only_with_directory() {
        let vars = PathVars::new("/f", params(1, 0));
        assert_eq!(vars.expand("export {export_dir}", None), "export {export_dir}");
        assert_eq!(
            vars.expand("export {export_dir}", Some(Path::new("/out/rtk"))),
            "export /out/rtk"
        );
    }

    #[test]
    fn test_unknown_tokens_left_verbatim() {
        let vars = PathVars::new("/f", params(1, 0));
        assert_eq!(vars.expand("x {nope} {fixtures_dir}", None), "x {nope} /f");
        assert_eq!(vars.expand("jq '{a: 1}' {", None), "jq '{a: 1}' {");
        assert_eq!(vars.expand("echo ${HOME}", None), "echo ${HOME}");
    }

    #[test]
    fn test_dollar_prefixed_key_is_expanded() {
        let vars = PathVars::new("/f", params(1, 0));
        assert_eq!(vars.expand("echo ${fixtures_dir}", None), "echo $/f");
    }

    #[test]
    fn test_prefix_keys_do_not_partially_match() {
        let vars = PathVars::new("/f", params(3, 0));
        // `static_envs` is a prefix of `static_envs_extra`; neither partial match nor
        // ordering may matter.
        assert_eq!(vars.expand("{static_envs_extra}", None), "{static_envs_extra}");
        assert_eq!(vars.expand("{all_static_main_files_rel}", None),
            "static-0001/main.jsonnet static-0002/main.jsonnet static-0003/main.jsonnet");
        assert_eq!(vars.expand("{all_static_main_files}", None),
            "/f/static-0001/main.jsonnet /f/static-0002/main.jsonnet /f/static-0003/main.jsonnet");
    }

    #[test]
    fn test_values_are_not_reexpanded() {
        let vars = PathVars::new("/f/{static_envs}", params(3, 0));
        assert_eq!(vars.expand("{fixtures_dir}", None), "/f/{static_envs}");
    }

    #[test]
    fn test_root_only_resolves_root() {
        let vars = PathVars::root_only("/recorded");
        assert_eq!(vars.expand("{fixtures_dir} {total_envs}", None), "/recorded {total_envs}");
        for p in Placeholder::ALL {
            let expected = matches!(p, Placeholder::FixturesDir | Placeholder::ExportDir);
            assert_eq!(
                vars.resolve(p, Some(Path::new("/out"))).is_some(),
                expected,
                "{}",
                p.key()
            );
        }
    }

    #[test]
    fn test_unknown_tokens() {
        assert_eq!(
            unknown_tokens("eval {single_static_main_file} {typo} ${HOME} {export_dir}"),
            vec!["{typo}".to_string()]
        );
        assert!(unknown_tokens("no tokens at all").is_empty());
    }

    #[test]
    fn test_key_table_round_trips() {
        for p in Placeholder::ALL {
            assert_eq!(Placeholder::from_key(p.key()), Some(p));
        }
        assert_eq!(Placeholder::from_key("fixtures"), None);
    }

    proptest! {
        #[test]
        fn prop_templates_without_tokens_unchanged(s in "[^{]*") {
            let vars = PathVars::new("/f", params(2, 2));
            prop_assert_eq!(vars.expand(&s, None), s.clone());
            prop_assert_eq!(vars.expand(&vars.expand(&s, None), None), s);
        }

        #[test]
        fn prop_distinct_roots_never_collide(a in "[a-z]{1,8}", b in "[a-z]{1,8}", s in 0u32..50, i in 0u32..50) {
            prop_assume!(a != b);
            let va = PathVars::new(format!("/tmp/{a}"), params(s, i));
            let vb = PathVars::new(format!("/tmp/{b}"), params(i, s));
            prop_assert_ne!(va.expand("{fixtures_dir}", None), vb.expand("{fixtures_dir}", None));
        }
    }
}
