//! Name to [`ClassRef`] lookup for the backtrace fallback

use super::ClassRef;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::OnceLock;

static GLOBAL_REGISTRY: OnceLock<ClassRegistry> = OnceLock::new();

/// Classes known to the process, keyed by fully qualified name
///
/// Populated as frames are entered and by explicit registration. A name that
/// was never registered cannot be turned back into a [`ClassRef`].
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: RwLock<HashMap<&'static str, ClassRef>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static ClassRegistry {
        GLOBAL_REGISTRY.get_or_init(ClassRegistry::new)
    }

    pub fn register(&self, class: ClassRef) {
        if self.classes.read().contains_key(class.name()) {
            return;
        }
        self.classes.write().insert(class.name(), class);
    }

    pub fn register_type<T: ?Sized + 'static>(&self) -> ClassRef {
        let class = ClassRef::of::<T>();
        self.register(class);
        class
    }

    pub fn resolve(&self, name: &str) -> Option<ClassRef> {
        self.classes.read().get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Registered;

    #[test]
    fn resolves_registered_names() {
        let registry = ClassRegistry::new();
        let class = registry.register_type::<Registered>();

        assert_eq!(registry.resolve(class.name()), Some(class));
        assert_eq!(registry.resolve("not::Registered"), None);
    }

    #[test]
    fn registration_is_idempotent() {
        let registry = ClassRegistry::new();
        registry.register(ClassRef::named("app::Foo"));
        registry.register(ClassRef::named("app::Foo"));
        assert_eq!(registry.len(), 1);
    }
}
