//! Scenario-level tests exercising the concrete cases from SPEC_FULL.md §8
//! end to end: a real `MethodInfo`/`Code` in, a `Graph` and `TraceResult`
//! out, through the crate's public API only.

use byteflow::{
    disassemble, trace, BaseType, Code, Constant, ConstantPool, Context, EdgeKind, FieldType,
    Interner, MethodAccessFlags, MethodInfo,
};
use indoc::indoc;

fn method_with_code(descriptor: &str, flags: MethodAccessFlags, code: Vec<u8>) -> MethodInfo {
    MethodInfo::new("Example", "run", flags, descriptor)
        .expect("descriptor")
        .with_code(Code::new(4, 4, code))
}

#[test]
fn hello_world_main_traces_clean_with_an_empty_exit_stack() -> Result<(), byteflow::Error> {
    let mut pool = ConstantPool::new();
    let out_field = {
        let name_and_type = pool.add_name_and_type("out", "Ljava/io/PrintStream;")?;
        let class = pool.add_class("java/lang/System")?;
        pool.add(Constant::FieldRef {
            class_index: class,
            name_and_type_index: name_and_type,
        })?
    };
    let hello_string = {
        let utf8 = pool.add_utf8("Hello")?;
        pool.add(Constant::String(utf8))?
    };
    let println_method = pool.add_method_ref(
        "java/io/PrintStream",
        "println",
        "(Ljava/lang/String;)V",
    )?;

    let mut code = vec![0xb2]; // getstatic
    code.extend_from_slice(&out_field.to_be_bytes());
    code.push(0x12); // ldc
    code.push(u8::try_from(hello_string).expect("fits in a byte for this pool"));
    code.push(0xb6); // invokevirtual
    code.extend_from_slice(&println_method.to_be_bytes());
    code.push(0xb1); // return

    let method = method_with_code("()V", MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, code);
    let mut graph = disassemble(&method)?;

    let real_blocks: Vec<_> = graph.blocks().filter(|block| !block.is_special()).collect();
    assert_eq!(1, real_blocks.len());
    assert_eq!(3, real_blocks[0].instructions.len());
    let out = graph.out_edges(0);
    assert_eq!(1, out.len());
    assert!(matches!(out[0].kind, EdgeKind::Fallthrough));

    let interner = Interner::new();
    let result = trace(&mut graph, &method, &pool, &interner, &Context::default())?;
    assert!(result.conflicts.is_empty());
    let exit_frame = &result.entries[&byteflow::graph::RETURN][0];
    assert!(exit_frame.stack.is_empty());
    Ok(())
}

#[test]
fn constant_pool_display_lists_every_referenced_entry() -> Result<(), byteflow::Error> {
    let mut pool = ConstantPool::new();
    let name_and_type = pool.add_name_and_type("out", "Ljava/io/PrintStream;")?;
    let class = pool.add_class("java/lang/System")?;
    pool.add(Constant::FieldRef {
        class_index: class,
        name_and_type_index: name_and_type,
    })?;

    let expected = indoc! {r#"
        ConstantPool (6 entries):
          #1 = Utf8("out")
          #2 = Utf8("Ljava/io/PrintStream;")
          #3 = NameAndType { name_index: 1, descriptor_index: 2 }
          #4 = Utf8("java/lang/System")
          #5 = Class(4)
          #6 = FieldRef { class_index: 5, name_and_type_index: 3 }
    "#};
    assert_eq!(expected, pool.to_string());
    Ok(())
}

#[test]
fn loop_with_iinc_converges_without_diverging() -> Result<(), byteflow::Error> {
    // i = 0; while (i < 10) { i++; } return;
    let mut code = vec![
        0x03, // iconst_0           (0)
        0x3b, // istore_0           (1)
        0x1a, // iload_0            (2) <- loop header
        0x10, 0x0a, // bipush 10    (3,4)
        0xa2, 0x00, 0x00, // if_icmpge -> patched below (5)
        0x84, 0x00, 0x01, // iinc 0, 1          (8,9,10)
        0xa7, 0x00, 0x00, // goto -> loop header (11)
        0xb1, // return                          (14), if_icmpge target
    ];
    let branch_offset = 5i32;
    let target = 14i32;
    let delta = i16::try_from(target - branch_offset).expect("fits i16");
    code[6..8].copy_from_slice(&delta.to_be_bytes());
    let goto_offset = 11i32;
    let goto_delta = i16::try_from(2i32 - goto_offset).expect("fits i16");
    code[12..14].copy_from_slice(&goto_delta.to_be_bytes());

    let method = method_with_code("()V", MethodAccessFlags::STATIC, code);
    let mut graph = disassemble(&method)?;
    let pool = ConstantPool::new();
    let interner = Interner::new();
    let result = trace(&mut graph, &method, &pool, &interner, &Context::default())?;

    assert!(result.entries.contains_key(&2), "loop header reached");
    assert!(result.pre_live[&2].contains(&0), "local 0 is read at the top of the loop");
    Ok(())
}

#[test]
fn tableswitch_with_default_and_three_cases_has_four_out_edges() -> Result<(), byteflow::Error> {
    let mut code = vec![0xaa]; // tableswitch (offset 0)
    while code.len() % 4 != 0 {
        code.push(0);
    }
    code.extend_from_slice(&28i32.to_be_bytes()); // default -> offset 28
    code.extend_from_slice(&0i32.to_be_bytes()); // low
    code.extend_from_slice(&2i32.to_be_bytes()); // high
    code.extend_from_slice(&29i32.to_be_bytes()); // case 0 -> offset 29
    code.extend_from_slice(&30i32.to_be_bytes()); // case 1 -> offset 30
    code.extend_from_slice(&31i32.to_be_bytes()); // case 2 -> offset 31
    while code.len() < 32 {
        code.push(0xb1); // return, one per trailing offset
    }

    let method = method_with_code("(I)V", MethodAccessFlags::STATIC, code);
    let graph = disassemble(&method)?;
    let out = graph.out_edges(0);
    assert_eq!(4, out.len());
    for expected_key in [0i32, 1, 2] {
        assert!(
            out.iter()
                .any(|edge| matches!(edge.kind, EdgeKind::Switch { key } if key == Some(expected_key))),
            "missing case {expected_key}"
        );
    }
    assert!(out.iter().any(|edge| matches!(edge.kind, EdgeKind::Switch { key: None })));
    Ok(())
}

#[test]
fn jsr_ret_subroutine_is_resolved_to_its_jsrs_fallthrough() -> Result<(), byteflow::Error> {
    let code = vec![
        0xa8, 0x00, 0x05, // jsr +5 -> offset 5         (0)
        0xb1, //             return                      (3), jsr fallthrough
        0x4c, //             astore_1                     (5) <- subroutine entry
        0xa9, 0x01, //       ret 1                         (6)
    ];
    let method = method_with_code("()V", MethodAccessFlags::STATIC, code);
    let mut graph = disassemble(&method)?;
    let pool = ConstantPool::new();
    let interner = Interner::new();
    let result = trace(&mut graph, &method, &pool, &interner, &Context::default())?;

    assert_eq!(Some(&3), result.subroutines.get(&0));
    let ret_edge = graph
        .out_edges(5)
        .into_iter()
        .find(|edge| matches!(edge.kind, EdgeKind::Ret))
        .expect("ret edge");
    assert_eq!(3, ret_edge.to);
    Ok(())
}

#[test]
fn uninitialized_receiver_is_replaced_after_invokespecial_init() -> Result<(), byteflow::Error> {
    let mut pool = ConstantPool::new();
    let class_index = pool.add_class("Example")?;
    let init_method = pool.add_method_ref("Example", "<init>", "()V")?;

    let mut code = vec![0xbb]; // new
    code.extend_from_slice(&class_index.to_be_bytes());
    code.push(0x59); // dup
    code.push(0xb7); // invokespecial
    code.extend_from_slice(&init_method.to_be_bytes());
    code.push(0x4b); // astore_0
    code.push(0xb1); // return

    let method = method_with_code("()V", MethodAccessFlags::STATIC, code);
    let mut graph = disassemble(&method)?;
    let interner = Interner::new();
    let result = trace(&mut graph, &method, &pool, &interner, &Context::default())?;

    let exit = &result.entries[&byteflow::graph::RETURN][0];
    assert!(exit.stack.is_empty());
    assert!(result.conflicts.is_empty());
    Ok(())
}

#[test]
fn malformed_goto_beyond_the_code_resolves_to_opaque_without_panicking() -> Result<(), byteflow::Error> {
    let mut code = vec![0xa7]; // goto
    code.extend_from_slice(&32767i16.to_be_bytes());
    code.push(0xb1); // return
    let method = method_with_code("()V", MethodAccessFlags::STATIC, code);
    let graph = disassemble(&method)?;
    let out = graph.out_edges(0);
    assert_eq!(1, out.len());
    assert_eq!(byteflow::graph::OPAQUE, out[0].to);
    Ok(())
}

#[test]
fn field_and_method_descriptor_round_trip_through_the_constant_pool() -> Result<(), byteflow::Error> {
    let mut pool = ConstantPool::new();
    let utf8 = pool.add_utf8("Ljava/lang/String;")?;
    assert_eq!(Some(&Constant::Utf8("Ljava/lang/String;".to_string())), pool.get(utf8));
    let field_type = FieldType::parse(pool.try_get_utf8(utf8)?)?;
    assert_eq!(FieldType::Object("java/lang/String".to_string()), field_type);

    let (parameters, return_type) = FieldType::parse_method_descriptor("(I[J)Z")?;
    assert_eq!(vec![
        FieldType::Base(BaseType::Int),
        FieldType::Array(Box::new(FieldType::Base(BaseType::Long))),
    ], parameters);
    assert_eq!(Some(FieldType::Base(BaseType::Boolean)), return_type);
    Ok(())
}
