/// A registered predicate: given a hierarchy vector, does this entity kind
/// claim it? The first handler that accepts wins — mirrors the
/// register-a-handler-per-kind pattern each entity kind uses to announce
/// itself to `enumerate` without the store crate knowing about entity types.
pub type HierarchyHandler = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<(&'static str, HierarchyHandler)>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry { handlers: Vec::new() }
    }

    /// Register `kind`'s handler. Order matters only in the pathological
    /// case where two kinds' predicates overlap; the first match wins.
    pub fn register(&mut self, kind: &'static str, handler: HierarchyHandler) {
        self.handlers.push((kind, handler));
    }

    /// Resolve the entity kind that claims `hierarchy`, or `None` if no
    /// registered handler accepts it.
    pub fn resolve(&self, hierarchy: &[String]) -> Option<&'static str> {
        self.handlers
            .iter()
            .find(|(_, h)| h(hierarchy))
            .map(|(kind, _)| *kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_handler_wins() {
        let mut registry = HandlerRegistry::new();
        registry.register("image", Box::new(|h| h.first().map(String::as_str) == Some("image")));
        registry.register("cluster", Box::new(|h| h.first().map(String::as_str) == Some("cluster")));

        assert_eq!(registry.resolve(&["cluster".into(), "fp".into(), "x".into()]), Some("cluster"));
        assert_eq!(registry.resolve(&["storage".into()]), None);
    }
}
