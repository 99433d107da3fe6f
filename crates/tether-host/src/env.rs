//! The host environment: class registry, heap, threads and main loop

use crate::class::{HostClass, MethodDescriptor};
use crate::error::{HostError, HostException, HostResult};
use crate::heap::{HostHeap, ObjectRef};
use crate::looper::MainLoop;
use crate::object::HostObject;
use crate::types::{normalize_class_name, HostType, OBJECT_CLASS};
use crate::value::HostValue;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_ENV_ID: AtomicU64 = AtomicU64::new(1);

/// Host environment limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    pub max_attached_threads: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_attached_threads: 64,
        }
    }
}

/// Registration of the current thread with one environment. Dropping it
/// (explicit detach or thread exit) frees the slot.
struct Attachment {
    env_id: u64,
    counter: Arc<AtomicUsize>,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

thread_local! {
    static ATTACHMENTS: RefCell<Vec<Attachment>> = RefCell::new(Vec::new());
}

pub struct HostEnvironment {
    id: u64,
    config: HostConfig,
    classes: RwLock<FxHashMap<String, Arc<HostClass>>>,
    heap: Mutex<HostHeap>,
    main_loop: MainLoop,
    attached: Arc<AtomicUsize>,
    shut_down: AtomicBool,
}

impl HostEnvironment {
    pub fn new(config: HostConfig) -> Self {
        Self {
            id: NEXT_ENV_ID.fetch_add(1, Ordering::Relaxed),
            config,
            classes: RwLock::new(FxHashMap::default()),
            heap: Mutex::new(HostHeap::new()),
            main_loop: MainLoop::new(),
            attached: Arc::new(AtomicUsize::new(0)),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn main_loop(&self) -> &MainLoop {
        &self.main_loop
    }

    // ========================================================================
    // Classes
    // ========================================================================

    /// Register (or replace) a class
    pub fn register_class(&self, class: HostClass) -> Arc<HostClass> {
        let class = Arc::new(class);
        let previous = self
            .classes
            .write()
            .insert(class.name().to_string(), class.clone());
        if previous.is_some() {
            tracing::debug!(class = class.name(), "replaced host class");
        }
        class
    }

    /// Look up a class by dotted or slash-separated name
    pub fn for_name(&self, name: &str) -> HostResult<Arc<HostClass>> {
        let name = normalize_class_name(name);
        self.classes
            .read()
            .get(&name)
            .cloned()
            .ok_or(HostError::ClassNotFound(name))
    }

    /// Registered classes sorted by name
    pub fn classes(&self) -> Vec<Arc<HostClass>> {
        let mut classes: Vec<_> = self.classes.read().values().cloned().collect();
        classes.sort_by(|a, b| a.name().cmp(b.name()));
        classes
    }

    // ========================================================================
    // Thread attachment
    // ========================================================================

    /// Attach the calling thread. Returns `false` if it was already attached.
    pub fn attach_current_thread(&self) -> HostResult<bool> {
        if self.is_shut_down() {
            return Err(HostError::Attach("environment is shut down".to_string()));
        }
        ATTACHMENTS.with(|attachments| {
            let mut attachments = attachments.borrow_mut();
            if attachments.iter().any(|a| a.env_id == self.id) {
                return Ok(false);
            }
            let limit = self.config.max_attached_threads;
            let claimed = self.attached.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            });
            if claimed.is_err() {
                return Err(HostError::Attach(format!(
                    "attached thread limit of {} reached",
                    limit
                )));
            }
            attachments.push(Attachment {
                env_id: self.id,
                counter: self.attached.clone(),
            });
            tracing::trace!(thread = ?std::thread::current().id(), "thread attached");
            Ok(true)
        })
    }

    /// Detach the calling thread. Returns `false` if it was not attached.
    pub fn detach_current_thread(&self) -> bool {
        ATTACHMENTS.with(|attachments| {
            let mut attachments = attachments.borrow_mut();
            let before = attachments.len();
            attachments.retain(|a| a.env_id != self.id);
            attachments.len() != before
        })
    }

    pub fn is_current_thread_attached(&self) -> bool {
        ATTACHMENTS.with(|attachments| attachments.borrow().iter().any(|a| a.env_id == self.id))
    }

    pub fn attached_thread_count(&self) -> usize {
        self.attached.load(Ordering::Acquire)
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Allocate an object of `class` with the given state
    pub fn allocate<T: Any + Send>(&self, class: &Arc<HostClass>, state: T) -> ObjectRef {
        self.heap.lock().insert(HostObject::new(class.clone(), state))
    }

    /// Strong reference to a live object
    pub fn object(&self, reference: ObjectRef) -> HostResult<Arc<HostObject>> {
        self.heap
            .lock()
            .get(reference)
            .ok_or(HostError::InvalidObject(reference))
    }

    pub fn class_of(&self, reference: ObjectRef) -> HostResult<Arc<HostClass>> {
        Ok(self.object(reference)?.class().clone())
    }

    pub fn live_objects(&self) -> usize {
        self.heap.lock().len()
    }

    /// Free objects no longer referenced outside the heap
    pub fn collect_garbage(&self) -> usize {
        let freed = self.heap.lock().collect();
        let count = freed.len();
        // Drop outside the heap lock
        drop(freed);
        if count > 0 {
            tracing::debug!(freed = count, "host heap collected");
        }
        count
    }

    // ========================================================================
    // Reflection calls
    // ========================================================================

    /// Whether `value` may be passed where `ty` is declared
    pub fn conforms(&self, value: &HostValue, ty: &HostType) -> bool {
        match (value, ty) {
            (HostValue::Null, ty) => ty.is_reference(),
            (HostValue::Boolean(_), HostType::Boolean)
            | (HostValue::Int(_), HostType::Int)
            | (HostValue::Long(_), HostType::Long)
            | (HostValue::Double(_), HostType::Double)
            | (HostValue::String(_), HostType::String) => true,
            (HostValue::String(_), HostType::Object(class)) => &**class == OBJECT_CLASS,
            (HostValue::Array { element, items }, HostType::Array(declared)) => {
                element == &**declared || items.iter().all(|item| self.conforms(item, declared))
            }
            (HostValue::Object(reference), HostType::Object(class)) => {
                match self.class_of(*reference) {
                    Ok(actual) => &**class == OBJECT_CLASS || actual.name() == &**class,
                    Err(_) => false,
                }
            }
            _ => false,
        }
    }

    fn check_arguments(
        &self,
        target: &str,
        params: &[HostType],
        args: &[HostValue],
    ) -> HostResult<()> {
        if params.len() != args.len() {
            return Err(HostError::ArgumentMismatch {
                target: target.to_string(),
                expected: format!("{} arguments", params.len()),
                found: format!("{} arguments", args.len()),
            });
        }
        for (param, arg) in params.iter().zip(args) {
            if !self.conforms(arg, param) {
                return Err(HostError::ArgumentMismatch {
                    target: target.to_string(),
                    expected: param.to_string(),
                    found: arg.type_name(),
                });
            }
        }
        Ok(())
    }

    /// Construct an instance, choosing the constructor by arity and
    /// argument types.
    pub fn new_instance(
        &self,
        class: &Arc<HostClass>,
        args: &[HostValue],
    ) -> HostResult<ObjectRef> {
        if self.is_shut_down() {
            return Err(HostError::ShutDown);
        }
        let target = format!("{}.<init>", class.name());
        let mut candidates = class
            .constructors()
            .iter()
            .filter(|c| c.arity() == args.len())
            .peekable();
        if candidates.peek().is_none() {
            return Err(HostError::NoSuchMethod {
                class: class.name().to_string(),
                name: "<init>".to_string(),
                arity: args.len(),
            });
        }
        let mut first_error = None;
        for constructor in candidates {
            match self.check_arguments(&target, &constructor.params, args) {
                Ok(()) => {
                    let state = (constructor.body())(self, args)?;
                    let object = HostObject::from_boxed(class.clone(), state);
                    return Ok(self.heap.lock().insert(object));
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        Err(first_error.unwrap_or(HostError::ClassNotFound(class.name().to_string())))
    }

    /// Call `method` reflectively. No environment lock is held while the
    /// method body runs.
    pub fn invoke(
        &self,
        method: &MethodDescriptor,
        receiver: Option<ObjectRef>,
        args: &[HostValue],
    ) -> HostResult<HostValue> {
        if self.is_shut_down() {
            return Err(HostError::ShutDown);
        }
        let target = format!("{}.{}", method.declaring_class, method.name);
        self.check_arguments(&target, &method.params, args)?;
        let object = match (method.is_static(), receiver) {
            (true, _) => None,
            (false, Some(reference)) => {
                let object = self.object(reference)?;
                if object.class_name() != &*method.declaring_class {
                    return Err(HostException::class_cast(format!(
                        "{} cannot be cast to {}",
                        object.class_name(),
                        method.declaring_class
                    ))
                    .into());
                }
                Some(object)
            }
            (false, None) => {
                return Err(HostException::new(
                    "java.lang.NullPointerException",
                    format!("{} called without a receiver", target),
                )
                .into())
            }
        };
        (method.body())(self, object.as_deref(), args).map_err(HostError::from)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Refuse further attachments and calls, and stop the main loop thread
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            self.main_loop.stop();
            tracing::debug!("host environment shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Default for HostEnvironment {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl fmt::Debug for HostEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostEnvironment")
            .field("id", &self.id)
            .field("classes", &self.classes.read().len())
            .field("attached", &self.attached_thread_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
