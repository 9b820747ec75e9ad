//! GC integration tests
//!
//! Every VM here runs with a zero threshold, so a collection happens before
//! each allocation. Anything the VM forgets to root is freed immediately.

use corvid_core::{FieldLayout, FunctionBuilder, Value, Vm, VmOptions};
use std::rc::Rc;

fn stress_vm() -> Vm {
    Vm::with_options(VmOptions {
        gc_threshold: 0,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_core_classes_survive_collection() {
    let mut vm = stress_vm();
    let live = vm.heap().live_count();
    // Six core classes plus the metaclasses of Bool, Null and Num
    assert_eq!(live, 9);

    assert_eq!(vm.collect_garbage(), 0);
    assert_eq!(vm.heap().live_count(), live);

    let core = vm.core();
    for class in core.iter() {
        assert!(vm.heap().contains(class));
        let meta = vm.class_of(Value::object(class)).unwrap();
        assert!(vm.heap().contains(meta));
    }
}

#[test]
fn test_classes_defined_by_bytecode_survive() {
    let mut vm = stress_vm();
    let main = vm.add_module("main");
    let object = vm.core().object;
    let new = vm.intern_method("new()").unwrap();
    let value = vm.intern_method("value").unwrap();

    let ctor = Rc::new(
        FunctionBuilder::new("new", main, 0)
            .construct()
            .constant(Value::i32(11))
            .store_field_this(0)
            .pop()
            .load_local(0)
            .ret()
            .build()
            .unwrap(),
    );
    let get = Rc::new(
        FunctionBuilder::new("value", main, 0)
            .load_field_this(0)
            .ret()
            .build()
            .unwrap(),
    );

    let cell_var = vm.define_variable(main, "Cell", Value::null()).unwrap();
    let sub_var = vm.define_variable(main, "SubCell", Value::null()).unwrap();
    let program = FunctionBuilder::new("main", main, 0)
        .constant(Value::object(object))
        .class("Cell", 1)
        .method(new, ctor.clone(), true)
        .method(value, get, false)
        .store_module_var(cell_var)
        .class("SubCell", 0)
        .method(new, ctor, true)
        .store_module_var(sub_var)
        .pop()
        .null()
        .ret()
        .build()
        .unwrap();
    vm.interpret(Rc::new(program)).unwrap();
    assert!(vm.gc_stats().collections > 0);

    let sub = vm.variable(main, sub_var).unwrap();
    let instance = vm.call_method(sub, new, &[]).unwrap();
    let held = vm.define_variable(main, "held", instance).unwrap();

    vm.collect_garbage();
    let sub_ref = sub.as_object().unwrap();
    let sub_meta = vm.class_of(sub).unwrap();
    let instance_ref = instance.as_object().unwrap();
    assert!(vm.heap().contains(sub_ref));
    assert!(vm.heap().contains(sub_meta));
    assert!(vm.heap().contains(instance_ref));
    assert_eq!(vm.call_method(instance, value, &[]).unwrap(), Value::i32(11));

    vm.set_variable(main, held, Value::null()).unwrap();
    vm.collect_garbage();
    assert!(!vm.heap().contains(instance_ref));
    assert!(vm.heap().contains(sub_ref));
}

#[test]
fn test_unreferenced_classes_are_reclaimed() {
    let mut vm = stress_vm();
    let object = vm.core().object;
    let before = vm.heap().live_count();

    let class = vm.create_class(object, FieldLayout::Fields(2), "Temp").unwrap();
    let meta = vm.class_of(Value::object(class)).unwrap();
    assert_eq!(vm.heap().live_count(), before + 2);

    vm.push_root(class);
    vm.collect_garbage();
    assert!(vm.heap().contains(class));
    assert!(vm.heap().contains(meta));

    vm.pop_root();
    assert_eq!(vm.collect_garbage(), 2);
    assert!(!vm.heap().contains(class));
    assert!(!vm.heap().contains(meta));
    assert_eq!(vm.heap().live_count(), before);
}

#[test]
fn test_instance_fields_keep_objects_alive() {
    let mut vm = stress_vm();
    let main = vm.add_module("main");
    let object = vm.core().object;

    let node = vm.create_class(object, FieldLayout::Fields(1), "Node").unwrap();
    vm.define_variable(main, "Node", Value::object(node)).unwrap();

    let tail = Value::object(vm.new_instance(node).unwrap());
    let tail_var = vm.define_variable(main, "tail", tail).unwrap();
    let head = Value::object(vm.new_instance(node).unwrap());
    vm.store_field(head, 0, tail).unwrap();
    let head_var = vm.define_variable(main, "head", head).unwrap();

    vm.set_variable(main, tail_var, Value::null()).unwrap();
    vm.collect_garbage();
    assert!(vm.heap().contains(tail.as_object().unwrap()));
    assert_eq!(vm.load_field(head, 0).unwrap(), tail);

    vm.set_variable(main, head_var, Value::null()).unwrap();
    assert_eq!(vm.collect_garbage(), 2);
}

#[test]
fn test_superclass_links_keep_ancestors_alive() {
    let mut vm = stress_vm();
    let object = vm.core().object;

    let a = vm.create_class(object, FieldLayout::Fields(0), "A").unwrap();
    vm.push_root(a);
    let b = vm.create_class(a, FieldLayout::Fields(0), "B").unwrap();
    vm.pop_root();

    vm.push_root(b);
    vm.collect_garbage();
    assert!(vm.heap().contains(a));
    assert!(vm.heap().contains(b));
    assert_eq!(vm.class(b).unwrap().superclass, Some(a));
    vm.pop_root();
}

#[test]
fn test_threshold_grows_with_live_set() {
    let mut vm = Vm::with_options(VmOptions {
        gc_threshold: 16,
        gc_growth_percent: 100,
        ..Default::default()
    })
    .unwrap();
    let object = vm.core().object;

    for i in 0..32 {
        let name = format!("C{}", i);
        vm.create_class(object, FieldLayout::Fields(0), &name).unwrap();
    }

    let stats = vm.heap_stats();
    assert!(vm.gc_stats().collections > 0);
    assert!(stats.threshold >= 16);
    assert!(stats.live_objects <= stats.slots);
}
