//! Static packaging-rule catalogs.
//!
//! A rule declares which binary name patterns bundle into one publishable
//! package and which other packages that bundle depends on. Catalogs are
//! built once at startup and passed explicitly; nothing here is mutated at
//! run time.

use glob::Pattern;

/// Internal package/binary name prefix of the distribution.
pub const INTERNAL_PREFIX: &str = "Sitecore";

/// A static declaration of one publishable package.
#[derive(Debug, Clone)]
pub struct PackagingRule {
    pub tag: String,
    pub id: String,
    pub title: String,
    pub description: String,
    /// Glob patterns matched against binary file names (no directory part).
    pub file_patterns: Vec<String>,
    /// Ids of other packages (post-substitution) or public package names.
    pub depends_on: Vec<String>,
}

impl PackagingRule {
    fn new(
        tag: &str,
        id: &str,
        title: &str,
        description: &str,
        file_patterns: &[&str],
        depends_on: &[&str],
    ) -> Self {
        Self {
            tag: tag.to_string(),
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            file_patterns: file_patterns.iter().map(|p| p.to_string()).collect(),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// Whether the given binary file name belongs to this rule.
    pub fn matches_file(&self, file_name: &str) -> bool {
        self.file_patterns
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .any(|p| p.matches(file_name))
    }
}

/// Substitute the `{major}` placeholder in rule ids and titles.
///
/// Applied once at catalog instantiation; downstream code only ever sees
/// concrete ids.
fn instantiate(mut rule: PackagingRule, major: u32) -> PackagingRule {
    let major = major.to_string();
    rule.id = rule.id.replace("{major}", &major);
    rule.title = rule.title.replace("{major}", &major);
    for dep in &mut rule.depends_on {
        *dep = dep.replace("{major}", &major);
    }
    rule
}

/// The functional-group catalog: each rule bundles several binaries selected
/// by name globs. Order matters: rules are resolved top to bottom, so a rule
/// may depend on any rule above it.
pub fn grouped_catalog(major: u32) -> Vec<PackagingRule> {
    [
        PackagingRule::new(
            "SitecoreKernel",
            "SitecoreKernel",
            "Sitecore Kernel Assemblies",
            "Main Sitecore Assemblies that are required for Sitecore development. ",
            &[
                "Lucene.Net.dll",
                "Sitecore.Kernel.dll",
                "Sitecore.Mvc.dll",
                "Sitecore.ItemWebApi.dll",
                "Sitecore.Logging.dll",
                "Sitecore.Update.dll",
                "Sitecore.Zip.dll",
            ],
            &[],
        ),
        PackagingRule::new(
            "SitecoreClient",
            "SitecoreClient",
            "Sitecore Client Assemblies",
            "Main Sitecore Assemblies that are required for Sitecore development. ",
            &[
                "Sitecore.*Client*.dll",
                "Sitecore.*Shell*.dll",
                "Sitecore.Apps.Loader.dll",
            ],
            &["SitecoreKernel"],
        ),
        PackagingRule::new(
            "SitecoreAnalytics",
            "SitecoreAnalytics",
            "Sitecore Analytics Assemblies",
            "Main Sitecore Assemblies that are necessary for Sitecore development with usage of Sitecore Analytics API. ",
            &[
                "Sitecore.*Analytics*.dll",
                "Sitecore.Automation*.dll",
                "Sitecore.SegmentBuilder.dll",
                "*Mongo*",
            ],
            &["SitecoreKernel"],
        ),
        PackagingRule::new(
            "SitecoreBuckets",
            "SitecoreBuckets",
            "Sitecore Buckets Assemblies",
            "Main Sitecore Assemblies that are necessary for Sitecore development with usage of Sitecore Buckets API. ",
            &["Sitecore.*Buckets*.dll"],
            &["SitecoreKernel"],
        ),
        PackagingRule::new(
            "SitecoreContentSearch",
            "SitecoreContentSearch",
            "Sitecore ContentSearch Assemblies",
            "Main Sitecore Assemblies that are necessary for Sitecore development with usage of Sitecore ContentSearch API. ",
            &["Sitecore.*ContentSearch*.dll"],
            &["SitecoreKernel"],
        ),
    ]
    .into_iter()
    .map(|rule| instantiate(rule, major))
    .collect()
}

/// The curated per-module catalog: thin packages over one or two assemblies,
/// expressing both internal and public third-party dependencies. Used on top
/// of the one-package-per-binary workflow.
pub fn curated_catalog(major: u32) -> Vec<PackagingRule> {
    [
        PackagingRule::new(
            "Sitecore.Core",
            "Sitecore.Core",
            "Sitecore Kernel Assembly",
            "Main Sitecore Assembly that are required for Sitecore development. ",
            &["Sitecore.Kernel.dll"],
            &["Newtonsoft.Json"],
        ),
        PackagingRule::new(
            "Sitecore.Client",
            "Sitecore.Client",
            "Sitecore Client Assemblies",
            "Main Sitecore Assemblies that are required for Sitecore development within the Sitecore Client. ",
            &["Sitecore.Client.dll"],
            &["Sitecore.Core"],
        ),
        PackagingRule::new(
            "Sitecore.Mvc",
            "Sitecore.Mvc",
            "Sitecore Mvc Assembly",
            "Main Sitecore Assembly that are necessary for Sitecore development with usage of Sitecore MVC. ",
            &["Sitecore.Mvc.dll"],
            &["Sitecore.Core", "Microsoft.AspNet.Mvc"],
        ),
        PackagingRule::new(
            "Sitecore.ExperienceEditor",
            "Sitecore.ExperienceEditor",
            "Sitecore Experience Editor Assemblies",
            "Main Sitecore Assemblies that are required for Sitecore development within the Experience Editor. ",
            &[
                "Sitecore.ExperienceEditor.dll",
                "Sitecore.ExperienceEditor.Speak.dll",
            ],
            &["Sitecore.Client"],
        ),
        PackagingRule::new(
            "Sitecore.Analytics",
            "Sitecore.Analytics",
            "Sitecore Analytics Assemblies",
            "Main Sitecore Assemblies that are necessary for Sitecore development with usage of Sitecore Analytics API. ",
            &[
                "Sitecore.Analytics.dll",
                "Sitecore.Analytics.Automation.dll",
                "Sitecore.Analytics.Core.dll",
                "Sitecore.Analytics.Model.dll",
                "Sitecore.Mvc.Analytics.dll",
            ],
            &["Sitecore.Core"],
        ),
        PackagingRule::new(
            "Sitecore.Buckets",
            "Sitecore.Buckets",
            "Sitecore Buckets Assemblies",
            "Main Sitecore Assemblies that are necessary for Sitecore development with usage of Sitecore Buckets API. ",
            &["Sitecore.Buckets.dll"],
            &["Sitecore.Core"],
        ),
        PackagingRule::new(
            "Sitecore.ContentSearch",
            "Sitecore.ContentSearch",
            "Sitecore ContentSearch Assemblies",
            "Main Sitecore Assemblies that are necessary for Sitecore development with usage of Sitecore ContentSearch API. ",
            &["Sitecore.ContentSearch.dll", "Sitecore.ContentSearch.Linq.dll"],
            &["Sitecore.Core"],
        ),
        PackagingRule::new(
            "Sitecore.ContentSearch.Analytics",
            "Sitecore.ContentSearch.Analytics",
            "Sitecore ContentSearch Analytics Assemblies",
            "Main Sitecore Assemblies that are necessary for Sitecore development with usage of Sitecore ContentSearch API. ",
            &["Sitecore.ContentSearch.Analytics.dll"],
            &["Sitecore.Analytics", "Sitecore.ContentSearch"],
        ),
    ]
    .into_iter()
    .map(|rule| instantiate(rule, major))
    .collect()
}
