//! Mark-sweep garbage collector
//!
//! Marking uses an explicit worklist so deep class hierarchies and long
//! instance chains cannot overflow the native stack.

use super::heap::Heap;
use super::roots::RootSet;
use crate::method::Method;
use crate::object::HeapObject;
use crate::value::{ObjRef, Value};
use std::time::{Duration, Instant};
use tracing::debug;

/// Garbage collector statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total objects freed
    pub objects_freed: usize,

    /// Total pause time
    pub total_pause_time: Duration,

    /// Last collection duration
    pub last_pause_time: Duration,
}

/// Mark-sweep garbage collector
#[derive(Debug)]
pub struct GarbageCollector {
    /// Object arena
    heap: Heap,

    /// Root set
    roots: RootSet,

    /// Live object count that triggers the next collection
    threshold: usize,

    /// Floor for `threshold` after a collection
    initial_threshold: usize,

    /// Growth applied to the surviving live count, in percent
    growth_percent: usize,

    /// Statistics
    stats: GcStats,
}

impl GarbageCollector {
    /// Create a collector.
    ///
    /// An initial threshold of zero collects before every allocation.
    pub fn new(threshold: usize, growth_percent: usize) -> Self {
        Self {
            heap: Heap::new(),
            roots: RootSet::new(),
            threshold,
            initial_threshold: threshold,
            growth_percent,
            stats: GcStats::default(),
        }
    }

    /// Borrow the heap
    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Mutably borrow the heap
    #[inline]
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Mutably borrow the root set
    #[inline]
    pub fn roots_mut(&mut self) -> &mut RootSet {
        &mut self.roots
    }

    /// Store an object without checking the threshold
    pub fn insert(&mut self, object: HeapObject) -> ObjRef {
        self.heap.insert(object)
    }

    /// Check if the live count has reached the threshold
    pub fn should_collect(&self) -> bool {
        self.heap.live_count() >= self.threshold
    }

    /// Run garbage collection from the current root set.
    ///
    /// Stack roots are cleared afterwards; temporary roots are kept.
    /// Returns the number of freed objects.
    pub fn collect(&mut self) -> usize {
        let start = Instant::now();
        let before = self.heap.live_count();

        self.mark();
        let freed = self.heap.sweep();
        self.roots.clear_stack_roots();

        let duration = start.elapsed();
        self.stats.collections += 1;
        self.stats.objects_freed += freed;
        self.stats.last_pause_time = duration;
        self.stats.total_pause_time += duration;

        let live = self.heap.live_count();
        self.threshold = if self.initial_threshold == 0 {
            0
        } else {
            (live * (100 + self.growth_percent) / 100).max(self.initial_threshold)
        };

        debug!(
            before,
            freed,
            live,
            threshold = self.threshold,
            pause_us = duration.as_micros() as u64,
            "garbage collection"
        );

        freed
    }

    /// Mark phase: mark everything reachable from the roots
    fn mark(&mut self) {
        let mut worklist: Vec<ObjRef> = self.roots.iter().collect();

        while let Some(obj) = worklist.pop() {
            if !self.heap.mark(obj) {
                continue;
            }
            let Some(object) = self.heap.get(obj) else {
                continue;
            };

            match object {
                HeapObject::Class(class) => {
                    worklist.extend(class.metaclass);
                    worklist.extend(class.superclass);
                    for (_, method) in class.methods.iter() {
                        if let Method::Closure(function) = method {
                            function.for_each_value(&mut |v| worklist.extend(v.as_object()));
                        }
                    }
                }
                HeapObject::Instance(instance) => {
                    worklist.push(instance.class);
                    worklist.extend(instance.fields().iter().filter_map(Value::as_object));
                }
                HeapObject::Opaque(opaque) => worklist.push(opaque.class),
            }
        }
    }

    /// Get GC statistics
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Get heap statistics
    pub fn heap_stats(&self) -> HeapStats {
        HeapStats {
            live_objects: self.heap.live_count(),
            slots: self.heap.capacity(),
            threshold: self.threshold,
        }
    }
}

/// Heap statistics
#[derive(Debug, Clone)]
pub struct HeapStats {
    /// Live objects
    pub live_objects: usize,

    /// Arena slots, live or free
    pub slots: usize,

    /// GC threshold
    pub threshold: usize,
}

impl Default for GarbageCollector {
    fn default() -> Self {
        Self::new(1024, 50)
    }
}
