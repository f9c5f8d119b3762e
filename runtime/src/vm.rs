use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;

use lasso::ThreadedRodeo;

use crate::class::Class;
use crate::config::VmConfig;
use crate::error::{ExitReason, JvmError, JvmResult};
use crate::keys::{ClassId, MethodId, MethodKey, Symbol};
use crate::method::Method;
use crate::thread::{CompletionSignal, Thread};

/// VM-wide class table: name → `ClassId` plus the arena itself. Classes are
/// never removed once loaded — there is no unload path for the lifetime of
/// a `Vm`.
#[derive(Default)]
struct ClassTable {
    classes: Vec<Arc<Class>>,
    by_name: HashMap<Symbol, ClassId>,
}

struct RunningThread {
    join_handle: Option<JoinHandle<()>>,
    completion: Arc<CompletionSignal>,
    cancel: Arc<std::sync::Mutex<Option<ExitReason>>>,
    result: Arc<std::sync::Mutex<Option<ExitReason>>>,
}

/// The virtual machine: the shared class table, the method arena, the
/// string interner every `Symbol` is resolved against, and the list of
/// live JVM threads. Each JVM thread runs on its own OS thread (the
/// concurrency model spec'd is parallel, not cooperative); the thread list
/// is guarded by a single coarse mutex, matching the low rate of thread
/// creation and teardown any real program exhibits.
pub struct Vm {
    pub interner: ThreadedRodeo,
    classes: RwLock<ClassTable>,
    methods: RwLock<Vec<Arc<Method>>>,
    threads: std::sync::Mutex<Vec<RunningThread>>,
    pub config: VmConfig,
}

impl Vm {
    pub fn new(config: VmConfig) -> Self {
        Vm {
            interner: ThreadedRodeo::new(),
            classes: RwLock::new(ClassTable::default()),
            methods: RwLock::new(Vec::new()),
            threads: std::sync::Mutex::new(Vec::new()),
            config,
        }
    }

    pub fn class(&self, id: ClassId) -> Arc<Class> {
        self.classes.read().unwrap().classes[id.index()].clone()
    }

    pub fn method(&self, id: MethodId) -> Arc<Method> {
        self.methods.read().unwrap()[id.index()].clone()
    }

    pub fn lookup_class_by_symbol(&self, name: Symbol) -> Option<ClassId> {
        self.classes.read().unwrap().by_name.get(&name).copied()
    }

    pub fn lookup_class_by_name(&self, name: &str) -> Option<ClassId> {
        let symbol = self.interner.get(name)?;
        self.lookup_class_by_symbol(symbol)
    }

    /// Reserves the next `ClassId` and hands back a closure-free builder
    /// pair: callers build the class's methods (which need to know their
    /// owner's `ClassId` up front) before the class itself is pushed.
    pub(crate) fn reserve_class_id(&self) -> ClassId {
        ClassId(self.classes.read().unwrap().classes.len() as u32)
    }

    pub(crate) fn register_class(&self, name: Symbol, class: Class) -> ClassId {
        let mut table = self.classes.write().unwrap();
        let id = ClassId(table.classes.len() as u32);
        table.classes.push(Arc::new(class));
        table.by_name.insert(name, id);
        id
    }

    /// Public door into `register_class` for the launcher's built-in
    /// classes (`java/lang/System` and the like), which have no `.class`
    /// file to run through `class_loader::load_class`.
    pub fn register_builtin_class(&self, name: Symbol, class: Class) -> ClassId {
        self.register_class(name, class)
    }

    pub(crate) fn register_method(&self, method: Method) -> MethodId {
        let mut methods = self.methods.write().unwrap();
        let id = MethodId(methods.len() as u32);
        methods.push(Arc::new(method));
        id
    }

    pub fn lookup_method(&self, class: ClassId, key: &MethodKey) -> Option<MethodId> {
        self.class(class).lookup_method(key)
    }

    /// Spawns a JVM thread running `method` from instruction 0 with the
    /// given initial locals (already laid out per the callee's slot
    /// convention), and registers it in the VM's thread list.
    pub fn start_thread(self: &Arc<Self>, method: MethodId, locals: Vec<Option<crate::value::Value>>) {
        let m = self.method(method);
        let thread = Thread::new(method, m.max_stack, locals);
        let completion = thread.completion.clone();
        let cancel = thread.cancel.clone();
        let result = thread.result.clone();
        let vm = Arc::clone(self);

        let join_handle = std::thread::spawn(move || {
            let mut thread = thread;
            crate::interpreter::run(&mut thread, &vm);
            thread.completion.mark_done();
        });

        self.threads.lock().unwrap().push(RunningThread {
            join_handle: Some(join_handle),
            completion,
            cancel,
            result,
        });
    }

    /// Sets every currently-registered thread's cancellation slot, per the
    /// spec'd "setting it more than once is unsupported" contract: threads
    /// that already had a reason set keep their original one.
    pub fn cancel_all(&self, reason: ExitReason) {
        for running in self.threads.lock().unwrap().iter() {
            let mut slot = running.cancel.lock().unwrap();
            if slot.is_none() {
                *slot = Some(reason.clone());
            }
        }
    }

    /// Repeatedly waits for the last live thread until none remain,
    /// mirroring the spec'd swap-with-last-on-completion pattern. Returns
    /// the first non-normal exit reason observed, if any.
    pub fn wait_for_completion(&self) -> JvmResult<()> {
        let mut first_error = None;
        loop {
            let next = {
                let mut threads = self.threads.lock().unwrap();
                threads.pop()
            };
            let Some(mut running) = next else { break };
            running.completion.wait();
            if let Some(handle) = running.join_handle.take() {
                let _ = handle.join();
            }
            if let Some(reason) = running.result.lock().unwrap().clone() {
                if first_error.is_none() && reason != ExitReason::Completed {
                    first_error = Some(reason);
                }
            }
        }
        match first_error {
            Some(reason) => Self::resolve_thread_exit(&reason),
            None => Ok(()),
        }
    }

    pub fn resolve_thread_exit(reason: &ExitReason) -> JvmResult<()> {
        match reason {
            ExitReason::Completed => Ok(()),
            ExitReason::Cancelled => Err(JvmError::ThreadExit(ExitReason::Cancelled)),
            ExitReason::UncaughtError(msg) => Err(JvmError::ThreadExit(ExitReason::UncaughtError(msg.clone()))),
        }
    }
}
