// ABOUTME: Icon resolver for the component auto-importer
// ABOUTME: Maps icon-name tags to generated icon component imports

use super::{ComponentResolution, ComponentResolver};
use crate::config::IconsOptions;
use crate::utils;

/// Resolves tags such as `<IconFoo/>`, `<carbon-add/>` or `<IconMdiAccount/>`
/// to `~icons/<collection>/<name>`.
#[derive(Debug, Clone)]
pub struct IconResolver {
    prefix: String,
    default_collection: String,
    /// Longest names first so `fa-solid` wins over `fa`
    collections: Vec<String>,
}

impl IconResolver {
    pub fn new(options: &IconsOptions) -> Self {
        let mut collections = options.collections.clone();
        collections.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Self {
            prefix: options.prefix.to_lowercase(),
            default_collection: options.default_collection.clone(),
            collections,
        }
    }

    fn split_collection<'a>(&self, name: &'a str) -> Option<(&str, &'a str)> {
        self.collections.iter().find_map(|collection| {
            name.strip_prefix(collection.as_str())
                .and_then(|rest| rest.strip_prefix('-'))
                .filter(|icon| !icon.is_empty())
                .map(|icon| (collection.as_str(), icon))
        })
    }

    /// The `(collection, icon)` pair a tag names, if any
    pub fn icon_for(&self, tag: &str) -> Option<(String, String)> {
        let kebab = utils::to_kebab_case(tag);

        let prefixed = if self.prefix.is_empty() {
            None
        } else {
            kebab
                .strip_prefix(self.prefix.as_str())
                .and_then(|rest| rest.strip_prefix('-'))
                .filter(|rest| !rest.is_empty())
        };

        match prefixed {
            Some(rest) => match self.split_collection(rest) {
                Some((collection, icon)) => Some((collection.to_string(), icon.to_string())),
                None => Some((self.default_collection.clone(), rest.to_string())),
            },
            None => self
                .split_collection(&kebab)
                .map(|(collection, icon)| (collection.to_string(), icon.to_string())),
        }
    }
}

impl ComponentResolver for IconResolver {
    fn resolve(&self, tag: &str) -> Option<ComponentResolution> {
        let (collection, icon) = self.icon_for(tag)?;
        Some(ComponentResolution::new(
            utils::to_pascal_case(tag),
            format!("~icons/{}/{}", collection, icon),
        ))
    }
}
