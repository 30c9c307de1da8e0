//! A process-global, type-indexed registry of shared services.
//!
//! Example binaries use it to hand singletons (the thread pool, the TLS
//! context) to components constructed far from `main`. Two registration
//! modes exist: a fixed instance leased through weak references, and a
//! factory invoked per lookup that returns a locally owned reference. The
//! core pipeline does not depend on the registry.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use once_cell::sync::Lazy;

type Getter<T> = Arc<dyn Fn() -> Managed<T> + Send + Sync>;

static SHARED: Lazy<SharedRegistry> = Lazy::new(|| SharedRegistry {
    getters: Mutex::new(HashMap::new()),
});

pub struct SharedRegistry {
    getters: Mutex<HashMap<TypeId, Box<dyn Any + Send>>>,
}

impl SharedRegistry {
    pub fn shared() -> &'static SharedRegistry {
        &SHARED
    }

    /// Registers the getter for `T`. Double registration is a fatal error.
    pub fn register_getter<T: Send + Sync + 'static>(&self, getter: Getter<T>) {
        let mut getters = self.getters.lock().unwrap();
        let id = TypeId::of::<T>();
        if getters.contains_key(&id) {
            panic!("getter already registered for {}", type_name::<T>());
        }
        getters.insert(id, Box::new(getter));
    }

    /// Produces a managed reference for `T`. A missing registration is a
    /// fatal error.
    pub fn instance<T: Send + Sync + 'static>(&self) -> Managed<T> {
        let getter = {
            let getters = self.getters.lock().unwrap();
            let entry = getters
                .get(&TypeId::of::<T>())
                .unwrap_or_else(|| panic!("no getter registered for {}", type_name::<T>()));
            entry
                .downcast_ref::<Getter<T>>()
                .expect("registry entry stored under the wrong type")
                .clone()
        };
        getter()
    }
}

enum Lease<T> {
    Local(Arc<T>),
    Shared(Weak<T>),
    Lazy,
}

impl<T> Clone for Lease<T> {
    fn clone(&self) -> Self {
        match self {
            Lease::Local(instance) => Lease::Local(instance.clone()),
            Lease::Shared(weak) => Lease::Shared(weak.clone()),
            Lease::Lazy => Lease::Lazy,
        }
    }
}

/// A polymorphic managed reference: locally owned, weakly shared, or lazy.
///
/// The default is lazy: the first dereference resolves it against the
/// global registry and the handle replaces itself with the result.
pub struct Managed<T> {
    lease: Mutex<Lease<T>>,
}

impl<T: Send + Sync + 'static> Managed<T> {
    pub fn local(instance: Arc<T>) -> Self {
        Self { lease: Mutex::new(Lease::Local(instance)) }
    }

    pub fn shared(instance: Weak<T>) -> Self {
        Self { lease: Mutex::new(Lease::Shared(instance)) }
    }

    pub fn lazy() -> Self {
        Self { lease: Mutex::new(Lease::Lazy) }
    }

    /// Dereferences the handle. Fatal when a weakly shared instance is
    /// gone, when lazy resolution finds no registration, or when
    /// resolution yields another lazy handle (self-resolution).
    pub fn get(&self) -> Arc<T> {
        let mut lease = self.lease.lock().unwrap();
        loop {
            match &*lease {
                Lease::Local(instance) => return instance.clone(),
                Lease::Shared(weak) => {
                    return weak
                        .upgrade()
                        .unwrap_or_else(|| panic!("shared {} instance is gone", type_name::<T>()))
                }
                Lease::Lazy => {
                    let resolved = SharedRegistry::shared().instance::<T>();
                    let resolved = resolved.lease.into_inner().unwrap();
                    if matches!(resolved, Lease::Lazy) {
                        panic!("lazy managed pointer resolution failed for {}", type_name::<T>());
                    }
                    *lease = resolved;
                }
            }
        }
    }

    /// True when the handle currently points at a live instance.
    pub fn is_alive(&self) -> bool {
        match &*self.lease.lock().unwrap() {
            Lease::Local(_) => true,
            Lease::Shared(weak) => weak.strong_count() > 0,
            Lease::Lazy => false,
        }
    }
}

impl<T: Send + Sync + 'static> Default for Managed<T> {
    fn default() -> Self {
        Self::lazy()
    }
}

impl<T: Send + Sync + 'static> Clone for Managed<T> {
    fn clone(&self) -> Self {
        Self { lease: Mutex::new(self.lease.lock().unwrap().clone()) }
    }
}

/// Registers a fixed instance; the registry leases weak references to it,
/// and this object keeps it alive.
pub struct SharedObject<T: Send + Sync + 'static> {
    instance: Arc<T>,
}

impl<T: Send + Sync + 'static> SharedObject<T> {
    pub fn new(instance: Arc<T>) -> Self {
        let weak = Arc::downgrade(&instance);
        SharedRegistry::shared().register_getter::<T>(Arc::new(move || Managed::shared(weak.clone())));
        Self { instance }
    }

    pub fn instance(&self) -> &Arc<T> {
        &self.instance
    }
}

/// Registers a constructor invoked on each lookup; lookups own what they
/// get back.
pub struct SharedFactory<T: Send + Sync + 'static> {
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> SharedFactory<T> {
    pub fn new(factory: impl Fn() -> Arc<T> + Send + Sync + 'static) -> Self {
        SharedRegistry::shared().register_getter::<T>(Arc::new(move || Managed::local(factory())));
        Self { _marker: std::marker::PhantomData }
    }
}
