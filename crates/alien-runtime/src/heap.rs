//! Heap objects and the mark-and-sweep collector
//!
//! Every runtime object lives in the `Heap` registry; the rest of the
//! system holds only `ObjRef` handles. A value holding a handle keeps the
//! object alive only while the handle is reachable from a root. The
//! collector traces by matching on the object variant, so no per-object
//! dispatch is involved.

use std::collections::HashMap;

use crate::bytecode::Chunk;
use crate::value::{format_number, Value};

/// Collection runs when the live object count reaches this many objects
/// for the first time; afterwards the threshold is twice the survivor
/// count of the previous collection.
pub const INITIAL_GC_THRESHOLD: usize = 50;

/// Handle to a heap object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(u32);

/// A heap-resident runtime object
#[derive(Debug)]
pub enum Obj {
    Function(Function),
    Class(Class),
    Instance(Instance),
    BoundMethod(BoundMethod),
}

/// A compiled function: its chunk plus call metadata
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub arity: usize,
    pub chunk: Chunk,
}

/// A class carries its method table; it has no fields of its own
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub methods: HashMap<String, ObjRef>,
}

impl Class {
    /// Look up a method by name
    pub fn find_method(&self, name: &str) -> Option<ObjRef> {
        self.methods.get(name).copied()
    }

    /// Add a method, overwriting any previous one with the same name
    pub fn add_method(&mut self, name: String, method: ObjRef) {
        self.methods.insert(name, method);
    }
}

/// An instance of a class with its field map
#[derive(Debug)]
pub struct Instance {
    pub class: ObjRef,
    pub fields: HashMap<String, Value>,
}

/// A method closed over its receiver, produced by property access
#[derive(Debug)]
pub struct BoundMethod {
    pub method: ObjRef,
    /// Always an instance handle at construction time
    pub receiver: Value,
}

/// One registry slot; the mark bit lives here, not in the object
#[derive(Debug)]
struct Slot {
    obj: Obj,
    marked: bool,
}

/// Object registry and collector state
#[derive(Debug)]
pub struct Heap {
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
    live: usize,
    next_gc: usize,
    collections: usize,
}

impl Heap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            next_gc: INITIAL_GC_THRESHOLD,
            collections: 0,
        }
    }

    /// Register an object, returning its handle
    pub fn alloc(&mut self, obj: Obj) -> ObjRef {
        self.live += 1;
        let slot = Slot { obj, marked: false };
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(slot);
                ObjRef(index)
            }
            None => {
                self.slots.push(Some(slot));
                ObjRef((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Borrow the object behind a handle
    pub fn get(&self, obj: ObjRef) -> &Obj {
        &self.slots[obj.0 as usize]
            .as_ref()
            .expect("use of a freed object handle")
            .obj
    }

    /// Mutably borrow the object behind a handle
    pub fn get_mut(&mut self, obj: ObjRef) -> &mut Obj {
        &mut self.slots[obj.0 as usize]
            .as_mut()
            .expect("use of a freed object handle")
            .obj
    }

    /// Borrow a handle known to refer to a function
    pub fn function(&self, obj: ObjRef) -> &Function {
        match self.get(obj) {
            Obj::Function(function) => function,
            other => panic!("handle does not refer to a function: {other:?}"),
        }
    }

    /// Number of live objects in the registry
    pub fn live_objects(&self) -> usize {
        self.live
    }

    /// Number of completed collections
    pub fn collections(&self) -> usize {
        self.collections
    }

    /// Whether the growth threshold has been reached
    pub fn should_collect(&self) -> bool {
        self.live >= self.next_gc
    }

    /// Mark from `roots`, sweep everything unreached, reset the threshold
    ///
    /// The mutator must pass every root: the operand stack, the global
    /// table, and the function of each active call frame.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = ObjRef>) {
        // Mark with an explicit worklist; marking is idempotent so cycles
        // and shared structure terminate.
        let mut pending: Vec<ObjRef> = roots.into_iter().collect();
        while let Some(obj) = pending.pop() {
            let slot = self.slots[obj.0 as usize]
                .as_mut()
                .expect("root or traced edge points at a freed object");
            if slot.marked {
                continue;
            }
            slot.marked = true;
            match &slot.obj {
                Obj::Function(function) => {
                    for constant in &function.chunk.constants {
                        if let Value::Obj(child) = constant {
                            pending.push(*child);
                        }
                    }
                }
                Obj::Class(class) => {
                    pending.extend(class.methods.values().copied());
                }
                Obj::Instance(instance) => {
                    pending.push(instance.class);
                    for field in instance.fields.values() {
                        if let Value::Obj(child) = field {
                            pending.push(*child);
                        }
                    }
                }
                Obj::BoundMethod(bound) => {
                    pending.push(bound.method);
                    if let Value::Obj(receiver) = &bound.receiver {
                        pending.push(*receiver);
                    }
                }
            }
        }

        // Sweep: free unmarked slots, clear the mark on survivors so the
        // next cycle starts clean.
        for (index, entry) in self.slots.iter_mut().enumerate() {
            match entry {
                Some(slot) if slot.marked => slot.marked = false,
                Some(_) => {
                    *entry = None;
                    self.free.push(index as u32);
                    self.live -= 1;
                }
                None => {}
            }
        }

        self.collections += 1;
        self.next_gc = self.live * 2;
    }

    /// Textual form of a value, following object handles
    pub fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::Obj(obj) => self.format_obj(*obj),
        }
    }

    fn format_obj(&self, obj: ObjRef) -> String {
        match self.get(obj) {
            Obj::Function(function) => format!("[func] {}", function.name),
            Obj::Class(class) => format!("[class] {}", class.name),
            Obj::Instance(instance) => {
                format!("[instance] -> {}", self.format_obj(instance.class))
            }
            Obj::BoundMethod(bound) => format!("[method] -> {}", self.format_obj(bound.method)),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
