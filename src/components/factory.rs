// ABOUTME: Element factory resolver for the component auto-importer
// ABOUTME: Maps `Vue<Element>` tags to generated wrapper components served as virtual modules

use super::{ComponentResolution, ComponentResolver};
use crate::utils;

pub const FACTORY_PREFIX: &str = "/@vue-factory/";
const TAG_PREFIX: &str = "vue-";

/// Elements a factory component can wrap
pub const ELEMENTS: &[&str] = &[
    "a", "article", "aside", "blockquote", "button", "canvas", "code", "div", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "iframe", "img",
    "input", "label", "li", "main", "nav", "ol", "p", "pre", "section", "span", "table",
    "td", "textarea", "th", "tr", "ul", "video",
];

/// Resolves tags such as `<VueDiv>` or `<vue-section>` to a generated
/// component that renders the plain element with the caller's attributes
/// and default slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct FactoryResolver;

impl FactoryResolver {
    pub fn new() -> Self {
        Self
    }

    /// The element a tag wraps, if it names one
    pub fn element_for(tag: &str) -> Option<&'static str> {
        let kebab = utils::to_kebab_case(tag);
        let element = kebab.strip_prefix(TAG_PREFIX)?;
        known_element(element)
    }
}

impl ComponentResolver for FactoryResolver {
    fn resolve(&self, tag: &str) -> Option<ComponentResolution> {
        let element = Self::element_for(tag)?;
        Some(ComponentResolution::new(
            utils::to_pascal_case(tag),
            format!("{}{}", FACTORY_PREFIX, element),
        ))
    }
}

pub fn known_element(name: &str) -> Option<&'static str> {
    ELEMENTS.iter().copied().find(|e| *e == name)
}

/// Source of the wrapper component for `element`
pub fn module_code(element: &str) -> String {
    let name = utils::to_pascal_case(&format!("{}{}", TAG_PREFIX, element));
    format!(
        "import {{ h, defineComponent }} from 'vue'\n\n\
         export default defineComponent({{\n  \
         name: '{name}',\n  \
         inheritAttrs: false,\n  \
         setup(_, {{ slots, attrs }}) {{\n    \
         return () => h('{element}', attrs, slots.default?.())\n  \
         }},\n}})\n",
        name = name,
        element = element
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_tags() {
        let factory = FactoryResolver::new();

        let div = factory.resolve("VueDiv").unwrap();
        assert_eq!(div.import_specifier, "VueDiv");
        assert_eq!(div.import_path, "/@vue-factory/div");

        assert_eq!(FactoryResolver::element_for("vue-section"), Some("section"));
        assert_eq!(FactoryResolver::element_for("VueH2"), Some("h2"));
        assert!(factory.resolve("VueBlink").is_none());
        assert!(factory.resolve("Vue").is_none());
        assert!(factory.resolve("Div").is_none());
    }

    #[test]
    fn test_module_code_renders_the_element() {
        let code = module_code("section");
        assert!(code.starts_with("import { h, defineComponent } from 'vue'"));
        assert!(code.contains("name: 'VueSection'"));
        assert!(code.contains("h('section', attrs, slots.default?.())"));
    }
}
