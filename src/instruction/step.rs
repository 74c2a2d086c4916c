//! Stack-effect (`step`) behavior for every opcode, grouped by family: one
//! function per family of the match, each matching the opcodes that share a
//! stack-effect shape. See SPEC_FULL.md §4.2 for the family list and
//! representative step contracts.

use super::{ArrayType, Instruction, WideInstruction};
use crate::Error::InvalidConstantPoolIndexType;
use crate::error::Result;
use crate::field_type::FieldType;
use crate::lattice::{Interner, Ref, Type};
use crate::pool::{Constant, ConstantPool};
use crate::tracer::context::Context;
use crate::tracer::frame::{ConstValue, EntryArena, EntryId, Frame};

impl Instruction {
    /// Mutates `frame` (and its backing `arena`) according to this
    /// instruction's JVMS-defined stack effect. Never returns an error for
    /// type mismatches — those are recorded as conflicts on the offending
    /// entry (see [`Frame::pop_expect`]); it returns `Err` only for a
    /// genuinely malformed constant pool reference.
    pub fn step(
        &self,
        frame: &mut Frame,
        arena: &mut EntryArena,
        pool: &ConstantPool,
        interner: &Interner,
        offset: u32,
        context: &Context,
    ) -> Result<()> {
        match self {
            Instruction::Nop => {}

            // --- PushConstant / BIPush / SIPush -----------------------------
            Instruction::Aconst_null => {
                frame.push(arena, Type::Reference(Ref::Null), Some(offset));
            }
            Instruction::Iconst_m1 => push_int(frame, arena, -1, offset, context),
            Instruction::Iconst_0 => push_int(frame, arena, 0, offset, context),
            Instruction::Iconst_1 => push_int(frame, arena, 1, offset, context),
            Instruction::Iconst_2 => push_int(frame, arena, 2, offset, context),
            Instruction::Iconst_3 => push_int(frame, arena, 3, offset, context),
            Instruction::Iconst_4 => push_int(frame, arena, 4, offset, context),
            Instruction::Iconst_5 => push_int(frame, arena, 5, offset, context),
            Instruction::Lconst_0 => push_long(frame, arena, 0, offset, context),
            Instruction::Lconst_1 => push_long(frame, arena, 1, offset, context),
            Instruction::Fconst_0 => push_float(frame, arena, 0.0, offset, context),
            Instruction::Fconst_1 => push_float(frame, arena, 1.0, offset, context),
            Instruction::Fconst_2 => push_float(frame, arena, 2.0, offset, context),
            Instruction::Dconst_0 => push_double(frame, arena, 0.0, offset, context),
            Instruction::Dconst_1 => push_double(frame, arena, 1.0, offset, context),
            Instruction::Bipush(value) => push_int(frame, arena, i32::from(*value), offset, context),
            Instruction::Sipush(value) => push_int(frame, arena, i32::from(*value), offset, context),

            // --- LoadConstant ------------------------------------------------
            Instruction::Ldc(index) => step_ldc(frame, arena, pool, interner, u16::from(*index), offset, context)?,
            Instruction::Ldc_w(index) | Instruction::Ldc2_w(index) => {
                step_ldc(frame, arena, pool, interner, *index, offset, context)?;
            }

            // --- LoadLocal ---------------------------------------------------
            Instruction::Iload(index) => step_load(frame, arena, u16::from(*index), Type::Int),
            Instruction::Iload_0 => step_load(frame, arena, 0, Type::Int),
            Instruction::Iload_1 => step_load(frame, arena, 1, Type::Int),
            Instruction::Iload_2 => step_load(frame, arena, 2, Type::Int),
            Instruction::Iload_3 => step_load(frame, arena, 3, Type::Int),
            Instruction::Lload(index) => step_load(frame, arena, u16::from(*index), Type::Long),
            Instruction::Lload_0 => step_load(frame, arena, 0, Type::Long),
            Instruction::Lload_1 => step_load(frame, arena, 1, Type::Long),
            Instruction::Lload_2 => step_load(frame, arena, 2, Type::Long),
            Instruction::Lload_3 => step_load(frame, arena, 3, Type::Long),
            Instruction::Fload(index) => step_load(frame, arena, u16::from(*index), Type::Float),
            Instruction::Fload_0 => step_load(frame, arena, 0, Type::Float),
            Instruction::Fload_1 => step_load(frame, arena, 1, Type::Float),
            Instruction::Fload_2 => step_load(frame, arena, 2, Type::Float),
            Instruction::Fload_3 => step_load(frame, arena, 3, Type::Float),
            Instruction::Dload(index) => step_load(frame, arena, u16::from(*index), Type::Double),
            Instruction::Dload_0 => step_load(frame, arena, 0, Type::Double),
            Instruction::Dload_1 => step_load(frame, arena, 1, Type::Double),
            Instruction::Dload_2 => step_load(frame, arena, 2, Type::Double),
            Instruction::Dload_3 => step_load(frame, arena, 3, Type::Double),
            Instruction::Aload(index) => step_load_ref(frame, arena, u16::from(*index), interner, offset),
            Instruction::Aload_0 => step_load_ref(frame, arena, 0, interner, offset),
            Instruction::Aload_1 => step_load_ref(frame, arena, 1, interner, offset),
            Instruction::Aload_2 => step_load_ref(frame, arena, 2, interner, offset),
            Instruction::Aload_3 => step_load_ref(frame, arena, 3, interner, offset),

            // --- StoreLocal --------------------------------------------------
            Instruction::Istore(index) => step_store(frame, arena, u16::from(*index), &Type::Int, offset)?,
            Instruction::Istore_0 => step_store(frame, arena, 0, &Type::Int, offset)?,
            Instruction::Istore_1 => step_store(frame, arena, 1, &Type::Int, offset)?,
            Instruction::Istore_2 => step_store(frame, arena, 2, &Type::Int, offset)?,
            Instruction::Istore_3 => step_store(frame, arena, 3, &Type::Int, offset)?,
            Instruction::Lstore(index) => step_store(frame, arena, u16::from(*index), &Type::Long, offset)?,
            Instruction::Lstore_0 => step_store(frame, arena, 0, &Type::Long, offset)?,
            Instruction::Lstore_1 => step_store(frame, arena, 1, &Type::Long, offset)?,
            Instruction::Lstore_2 => step_store(frame, arena, 2, &Type::Long, offset)?,
            Instruction::Lstore_3 => step_store(frame, arena, 3, &Type::Long, offset)?,
            Instruction::Fstore(index) => step_store(frame, arena, u16::from(*index), &Type::Float, offset)?,
            Instruction::Fstore_0 => step_store(frame, arena, 0, &Type::Float, offset)?,
            Instruction::Fstore_1 => step_store(frame, arena, 1, &Type::Float, offset)?,
            Instruction::Fstore_2 => step_store(frame, arena, 2, &Type::Float, offset)?,
            Instruction::Fstore_3 => step_store(frame, arena, 3, &Type::Float, offset)?,
            Instruction::Dstore(index) => step_store(frame, arena, u16::from(*index), &Type::Double, offset)?,
            Instruction::Dstore_0 => step_store(frame, arena, 0, &Type::Double, offset)?,
            Instruction::Dstore_1 => step_store(frame, arena, 1, &Type::Double, offset)?,
            Instruction::Dstore_2 => step_store(frame, arena, 2, &Type::Double, offset)?,
            Instruction::Dstore_3 => step_store(frame, arena, 3, &Type::Double, offset)?,
            Instruction::Astore(index) => step_store_ref(frame, arena, u16::from(*index))?,
            Instruction::Astore_0 => step_store_ref(frame, arena, 0)?,
            Instruction::Astore_1 => step_store_ref(frame, arena, 1)?,
            Instruction::Astore_2 => step_store_ref(frame, arena, 2)?,
            Instruction::Astore_3 => step_store_ref(frame, arena, 3)?,

            // --- ArrayLoad / ArrayStore / ArrayLength / NewArray ------------
            Instruction::Iaload => step_array_load(frame, arena, Type::Int, offset)?,
            Instruction::Faload => step_array_load(frame, arena, Type::Float, offset)?,
            Instruction::Laload => step_array_load(frame, arena, Type::Long, offset)?,
            Instruction::Daload => step_array_load(frame, arena, Type::Double, offset)?,
            Instruction::Baload | Instruction::Caload | Instruction::Saload => {
                step_array_load(frame, arena, Type::Int, offset)?;
            }
            Instruction::Aaload => step_array_load_ref(frame, arena, interner, offset)?,
            Instruction::Iastore => step_array_store(frame, arena, &Type::Int, offset)?,
            Instruction::Fastore => step_array_store(frame, arena, &Type::Float, offset)?,
            Instruction::Lastore => step_array_store(frame, arena, &Type::Long, offset)?,
            Instruction::Dastore => step_array_store(frame, arena, &Type::Double, offset)?,
            Instruction::Bastore | Instruction::Castore | Instruction::Sastore => {
                step_array_store(frame, arena, &Type::Int, offset)?;
            }
            Instruction::Aastore => {
                frame.pop_expect(arena, &Type::object(interner), offset)?;
                frame.pop_expect(arena, &Type::Int, offset)?;
                frame.pop(arena);
            }
            Instruction::Arraylength => {
                frame.pop(arena);
                frame.push(arena, Type::Int, Some(offset));
            }
            Instruction::Newarray(array_type) => {
                frame.pop_expect(arena, &Type::Int, offset)?;
                let elem = array_primitive_type(*array_type);
                frame.push(arena, Type::Reference(Ref::Array(Box::new(elem))), Some(offset));
            }
            Instruction::Anewarray(index) => {
                frame.pop_expect(arena, &Type::Int, offset)?;
                let class_name = pool.try_get_class(*index)?;
                let elem = Type::Reference(Ref::Class(interner.intern(class_name)));
                frame.push(arena, Type::Reference(Ref::Array(Box::new(elem))), Some(offset));
            }
            Instruction::Multianewarray(index, dimensions) => {
                for _ in 0..*dimensions {
                    frame.pop_expect(arena, &Type::Int, offset)?;
                }
                let class_name = pool.try_get_class(*index)?;
                frame.push(
                    arena,
                    Type::Reference(Ref::Array(Box::new(Type::Reference(Ref::Class(
                        interner.intern(class_name),
                    ))))),
                    Some(offset),
                );
            }
            Instruction::New(index) => {
                let _ = pool.try_get_class(*index)?;
                frame.push(arena, Type::Reference(Ref::Uninitialized { src: offset }), Some(offset));
            }

            // --- Arithmetic / Negate / Shift / Bitwise ----------------------
            Instruction::Iadd | Instruction::Isub | Instruction::Imul | Instruction::Idiv | Instruction::Irem
            | Instruction::Iand | Instruction::Ior | Instruction::Ixor => {
                step_binop(frame, arena, &Type::Int, offset)?;
            }
            Instruction::Ladd | Instruction::Lsub | Instruction::Lmul | Instruction::Ldiv | Instruction::Lrem
            | Instruction::Land | Instruction::Lor | Instruction::Lxor => {
                step_binop(frame, arena, &Type::Long, offset)?;
            }
            Instruction::Fadd | Instruction::Fsub | Instruction::Fmul | Instruction::Fdiv | Instruction::Frem => {
                step_binop(frame, arena, &Type::Float, offset)?;
            }
            Instruction::Dadd | Instruction::Dsub | Instruction::Dmul | Instruction::Ddiv | Instruction::Drem => {
                step_binop(frame, arena, &Type::Double, offset)?;
            }
            Instruction::Ishl | Instruction::Ishr | Instruction::Iushr => {
                frame.pop_expect(arena, &Type::Int, offset)?;
                step_unop(frame, arena, &Type::Int, offset)?;
            }
            Instruction::Lshl | Instruction::Lshr | Instruction::Lushr => {
                frame.pop_expect(arena, &Type::Int, offset)?;
                step_unop(frame, arena, &Type::Long, offset)?;
            }
            Instruction::Ineg => step_unop(frame, arena, &Type::Int, offset)?,
            Instruction::Lneg => step_unop(frame, arena, &Type::Long, offset)?,
            Instruction::Fneg => step_unop(frame, arena, &Type::Float, offset)?,
            Instruction::Dneg => step_unop(frame, arena, &Type::Double, offset)?,
            Instruction::Iinc(index, delta) => step_iinc(frame, arena, u16::from(*index), i32::from(*delta), context),

            // --- Conversions ---------------------------------------------
            Instruction::I2l => step_convert(frame, arena, &Type::Int, Type::Long, offset)?,
            Instruction::I2f => step_convert(frame, arena, &Type::Int, Type::Float, offset)?,
            Instruction::I2d => step_convert(frame, arena, &Type::Int, Type::Double, offset)?,
            Instruction::L2i => step_convert(frame, arena, &Type::Long, Type::Int, offset)?,
            Instruction::L2f => step_convert(frame, arena, &Type::Long, Type::Float, offset)?,
            Instruction::L2d => step_convert(frame, arena, &Type::Long, Type::Double, offset)?,
            Instruction::F2i => step_convert(frame, arena, &Type::Float, Type::Int, offset)?,
            Instruction::F2l => step_convert(frame, arena, &Type::Float, Type::Long, offset)?,
            Instruction::F2d => step_convert(frame, arena, &Type::Float, Type::Double, offset)?,
            Instruction::D2i => step_convert(frame, arena, &Type::Double, Type::Int, offset)?,
            Instruction::D2l => step_convert(frame, arena, &Type::Double, Type::Long, offset)?,
            Instruction::D2f => step_convert(frame, arena, &Type::Double, Type::Float, offset)?,
            Instruction::I2b | Instruction::I2c | Instruction::I2s => {
                step_convert(frame, arena, &Type::Int, Type::Int, offset)?;
            }

            // --- Compare -----------------------------------------------------
            Instruction::Lcmp => step_compare(frame, arena, &Type::Long, offset)?,
            Instruction::Fcmpl | Instruction::Fcmpg => step_compare(frame, arena, &Type::Float, offset)?,
            Instruction::Dcmpl | Instruction::Dcmpg => step_compare(frame, arena, &Type::Double, offset)?,

            // --- Stack manipulation ------------------------------------------
            Instruction::Pop => {
                frame.stack.pop();
            }
            Instruction::Pop2 => {
                frame.stack.pop();
                frame.stack.pop();
            }
            Instruction::Dup => step_dup(frame),
            Instruction::Dup_x1 => step_dup_x1(frame),
            Instruction::Dup_x2 => step_dup_x2(frame, arena),
            Instruction::Dup2 => step_dup2(frame),
            Instruction::Dup2_x1 => step_dup2_x1(frame),
            Instruction::Dup2_x2 => step_dup2_x2(frame),
            Instruction::Swap => step_swap(frame, arena),

            // --- Control flow (stack effects only; edges are the graph's job) --
            Instruction::Ifeq(_) | Instruction::Ifne(_) | Instruction::Iflt(_) | Instruction::Ifge(_)
            | Instruction::Ifgt(_) | Instruction::Ifle(_) => {
                frame.pop_expect(arena, &Type::Int, offset)?;
            }
            Instruction::If_icmpeq(_) | Instruction::If_icmpne(_) | Instruction::If_icmplt(_)
            | Instruction::If_icmpge(_) | Instruction::If_icmpgt(_) | Instruction::If_icmple(_) => {
                frame.pop_expect(arena, &Type::Int, offset)?;
                frame.pop_expect(arena, &Type::Int, offset)?;
            }
            Instruction::If_acmpeq(_) | Instruction::If_acmpne(_) => {
                frame.pop(arena);
                frame.pop(arena);
            }
            Instruction::Ifnull(_) | Instruction::Ifnonnull(_) => {
                frame.pop(arena);
            }
            Instruction::Goto(_) | Instruction::Goto_w(_) => {}
            Instruction::Jsr(_) | Instruction::Jsr_w(_) => {
                frame.push(arena, Type::ReturnAddress { src: offset }, Some(offset));
            }
            Instruction::Ret(_) => {}
            Instruction::Tableswitch(_) | Instruction::Lookupswitch(_) => {
                frame.pop_expect(arena, &Type::Int, offset)?;
            }

            // --- Returns / throw / monitors ----------------------------------
            Instruction::Ireturn => step_return(frame, arena, &Type::Int, offset)?,
            Instruction::Lreturn => step_return(frame, arena, &Type::Long, offset)?,
            Instruction::Freturn => step_return(frame, arena, &Type::Float, offset)?,
            Instruction::Dreturn => step_return(frame, arena, &Type::Double, offset)?,
            Instruction::Areturn => {
                let id = frame.pop(arena);
                frame.return_(id);
            }
            Instruction::Return => frame.return_(None),
            Instruction::Athrow => {
                if let Some(id) = frame.pop(arena) {
                    frame.throw(id);
                }
            }
            Instruction::Monitorenter | Instruction::Monitorexit => {
                frame.pop(arena);
            }
            Instruction::Checkcast(index) => {
                let class_name = pool.try_get_class(*index)?;
                let id = frame.pop(arena);
                let ty = Type::Reference(Ref::Class(interner.intern(class_name)));
                if let Some(id) = id {
                    let source = arena.get(id).source;
                    frame.push(arena, ty, source);
                }
            }
            Instruction::Instanceof(index) => {
                let _ = pool.try_get_class(*index)?;
                frame.pop(arena);
                frame.push(arena, Type::Int, Some(offset));
            }

            // --- Field access --------------------------------------------------
            Instruction::Getstatic(index) => {
                let field_type = resolve_field_descriptor(pool, *index)?;
                let ty = Type::from_field_type(&field_type, interner);
                frame.push(arena, ty, Some(offset));
            }
            Instruction::Putstatic(index) => {
                let field_type = resolve_field_descriptor(pool, *index)?;
                let ty = Type::from_field_type(&field_type, interner);
                frame.pop_expect(arena, &ty, offset)?;
            }
            Instruction::Getfield(index) => {
                let field_type = resolve_field_descriptor(pool, *index)?;
                frame.pop_expect(arena, &Type::object(interner), offset)?;
                let ty = Type::from_field_type(&field_type, interner);
                frame.push(arena, ty, Some(offset));
            }
            Instruction::Putfield(index) => {
                let field_type = resolve_field_descriptor(pool, *index)?;
                let ty = Type::from_field_type(&field_type, interner);
                frame.pop_expect(arena, &ty, offset)?;
                frame.pop_expect(arena, &Type::object(interner), offset)?;
            }

            // --- Invocation ------------------------------------------------
            Instruction::Invokevirtual(index)
            | Instruction::Invokestatic(index)
            | Instruction::Invokeinterface(index, _) => {
                let is_static = matches!(self, Instruction::Invokestatic(_));
                let (_, _, descriptor) = resolve_method_descriptor(pool, *index)?;
                step_invoke(frame, arena, interner, &descriptor, !is_static, offset)?;
            }
            Instruction::Invokespecial(index) => {
                let (class_name, name, descriptor) = resolve_method_descriptor(pool, *index)?;
                if name == "<init>" {
                    step_invoke_init(frame, arena, interner, &class_name, &descriptor, offset)?;
                } else {
                    step_invoke(frame, arena, interner, &descriptor, true, offset)?;
                }
            }
            Instruction::Invokedynamic(index) => {
                let descriptor = resolve_invoke_dynamic_descriptor(pool, *index)?;
                step_invoke(frame, arena, interner, &descriptor, false, offset)?;
            }

            Instruction::Wide(wide) => step_wide(wide, frame, arena, offset, context)?,
        }
        Ok(())
    }
}

fn push_int(frame: &mut Frame, arena: &mut EntryArena, value: i32, offset: u32, context: &Context) {
    let id = frame.push(arena, Type::Int, Some(offset));
    if context.constant_propagation() {
        arena.get_mut(id).value = Some(ConstValue::Int(value));
    }
}

fn push_long(frame: &mut Frame, arena: &mut EntryArena, value: i64, offset: u32, context: &Context) {
    let id = frame.push(arena, Type::Long, Some(offset));
    if context.constant_propagation() {
        arena.get_mut(id).value = Some(ConstValue::Long(value));
    }
}

fn push_float(frame: &mut Frame, arena: &mut EntryArena, value: f32, offset: u32, context: &Context) {
    let id = frame.push(arena, Type::Float, Some(offset));
    if context.constant_propagation() {
        arena.get_mut(id).value = Some(ConstValue::Float(value));
    }
}

fn push_double(frame: &mut Frame, arena: &mut EntryArena, value: f64, offset: u32, context: &Context) {
    let id = frame.push(arena, Type::Double, Some(offset));
    if context.constant_propagation() {
        arena.get_mut(id).value = Some(ConstValue::Double(value));
    }
}

fn step_ldc(
    frame: &mut Frame,
    arena: &mut EntryArena,
    pool: &ConstantPool,
    interner: &Interner,
    index: u16,
    offset: u32,
    context: &Context,
) -> Result<()> {
    match pool.try_get(index)? {
        Constant::Integer(value) => push_int(frame, arena, *value, offset, context),
        Constant::Float(value) => push_float(frame, arena, *value, offset, context),
        Constant::Long(value) => push_long(frame, arena, *value, offset, context),
        Constant::Double(value) => push_double(frame, arena, *value, offset, context),
        Constant::String(_) => {
            frame.push(arena, Type::Reference(Ref::Class(interner.intern("java/lang/String"))), Some(offset));
        }
        Constant::Class(_) => {
            frame.push(arena, Type::Reference(Ref::Class(interner.intern("java/lang/Class"))), Some(offset));
        }
        Constant::MethodHandle { .. } => {
            frame.push(
                arena,
                Type::Reference(Ref::Class(interner.intern("java/lang/invoke/MethodHandle"))),
                Some(offset),
            );
        }
        Constant::MethodType(_) => {
            frame.push(
                arena,
                Type::Reference(Ref::Class(interner.intern("java/lang/invoke/MethodType"))),
                Some(offset),
            );
        }
        Constant::Dynamic { .. } => {
            frame.push(arena, Type::object(interner), Some(offset));
        }
        _ => return Err(InvalidConstantPoolIndexType(index)),
    }
    Ok(())
}

fn step_load(frame: &mut Frame, arena: &mut EntryArena, index: u16, ty: Type) {
    if let Some(id) = frame.load(index) {
        push_loaded(frame, arena, id);
    } else {
        frame.push(arena, ty, None);
    }
}

/// Pushes an existing entry back onto the stack, restoring the hidword
/// placeholder a category-2 value needs to occupy its second slot (the
/// placeholder itself carries no identity worth preserving across loads).
fn push_loaded(frame: &mut Frame, arena: &mut EntryArena, id: EntryId) {
    frame.push_entry(id);
    if arena.get(id).ty.is_category2() {
        let hi = arena.alloc(Type::Top, None);
        arena.get_mut(hi).hidword = true;
        frame.push_entry(hi);
    }
}

fn step_load_ref(frame: &mut Frame, arena: &mut EntryArena, index: u16, interner: &Interner, offset: u32) {
    if let Some(id) = frame.load(index) {
        frame.push_entry(id);
    } else {
        frame.push(arena, Type::object(interner), Some(offset));
    }
}

fn step_store(frame: &mut Frame, arena: &mut EntryArena, index: u16, expected: &Type, offset: u32) -> Result<()> {
    let id = frame.pop_expect(arena, expected, offset)?;
    frame.store(arena, index, id);
    Ok(())
}

fn step_store_ref(frame: &mut Frame, arena: &mut EntryArena, index: u16) -> Result<()> {
    let Some(id) = frame.pop(arena) else {
        return Err(crate::Error::ShortRead { expected: 1, actual: 0 });
    };
    frame.store(arena, index, id);
    Ok(())
}

fn step_array_load(frame: &mut Frame, arena: &mut EntryArena, ty: Type, offset: u32) -> Result<()> {
    frame.pop_expect(arena, &Type::Int, offset)?;
    frame.pop(arena);
    frame.push(arena, ty, Some(offset));
    Ok(())
}

fn step_array_load_ref(frame: &mut Frame, arena: &mut EntryArena, interner: &Interner, offset: u32) -> Result<()> {
    frame.pop_expect(arena, &Type::Int, offset)?;
    let array_ref = frame.pop(arena);
    let elem = array_ref
        .and_then(|id| match &arena.get(id).ty {
            Type::Reference(Ref::Array(elem)) => Some((**elem).clone()),
            _ => None,
        })
        .unwrap_or_else(|| Type::object(interner));
    frame.push(arena, elem, Some(offset));
    Ok(())
}

fn step_array_store(frame: &mut Frame, arena: &mut EntryArena, expected: &Type, offset: u32) -> Result<()> {
    frame.pop_expect(arena, expected, offset)?;
    frame.pop_expect(arena, &Type::Int, offset)?;
    frame.pop(arena);
    Ok(())
}

fn array_primitive_type(array_type: ArrayType) -> Type {
    match array_type {
        ArrayType::Float => Type::Float,
        ArrayType::Double => Type::Double,
        ArrayType::Long => Type::Long,
        ArrayType::Boolean | ArrayType::Byte | ArrayType::Char | ArrayType::Short | ArrayType::Int => Type::Int,
    }
}

fn step_binop(frame: &mut Frame, arena: &mut EntryArena, ty: &Type, offset: u32) -> Result<()> {
    frame.pop_expect(arena, ty, offset)?;
    frame.pop_expect(arena, ty, offset)?;
    frame.push(arena, ty.clone(), Some(offset));
    Ok(())
}

fn step_unop(frame: &mut Frame, arena: &mut EntryArena, ty: &Type, offset: u32) -> Result<()> {
    frame.pop_expect(arena, ty, offset)?;
    frame.push(arena, ty.clone(), Some(offset));
    Ok(())
}

fn step_convert(frame: &mut Frame, arena: &mut EntryArena, from: &Type, to: Type, offset: u32) -> Result<()> {
    frame.pop_expect(arena, from, offset)?;
    frame.push(arena, to, Some(offset));
    Ok(())
}

fn step_compare(frame: &mut Frame, arena: &mut EntryArena, ty: &Type, offset: u32) -> Result<()> {
    frame.pop_expect(arena, ty, offset)?;
    frame.pop_expect(arena, ty, offset)?;
    frame.push(arena, Type::Int, Some(offset));
    Ok(())
}

fn step_iinc(frame: &mut Frame, arena: &mut EntryArena, index: u16, delta: i32, context: &Context) {
    if !frame.defs.contains(&index) {
        frame.uses.insert(index);
    }
    frame.defs.insert(index);
    if let Some(id) = frame.locals.get(&index).copied() {
        if context.constant_propagation() {
            if let Some(ConstValue::Int(value)) = arena.get(id).value {
                let new_id = arena.alloc(Type::Int, None);
                arena.get_mut(new_id).value = Some(ConstValue::Int(value.wrapping_add(delta)));
                frame.locals.insert(index, new_id);
            }
        }
    }
}

fn step_return(frame: &mut Frame, arena: &mut EntryArena, expected: &Type, offset: u32) -> Result<()> {
    let id = frame.pop_expect(arena, expected, offset)?;
    frame.return_(Some(id));
    Ok(())
}

fn step_dup(frame: &mut Frame) {
    if let Some(&top) = frame.stack.last() {
        frame.stack.push(top);
    }
}

fn step_dup_x1(frame: &mut Frame) {
    let len = frame.stack.len();
    if len >= 2 {
        let top = frame.stack[len - 1];
        frame.stack.insert(len - 2, top);
    }
}

/// If the top entry is itself a hidword (duplicating the top word of a
/// two-word value already sitting in place), reinsert the same id — no new
/// value is created, so the hi/lo pairing below it is untouched. Otherwise
/// the duplicate is a new one-word value wedged between the halves of
/// whatever two-word value lies beneath it, so it is cloned with `split` set
/// rather than aliasing the original (see `Entry::split`).
fn step_dup_x2(frame: &mut Frame, arena: &mut EntryArena) {
    let len = frame.stack.len();
    if len >= 3 {
        let top = frame.stack[len - 1];
        if arena.get(top).hidword {
            frame.stack.insert(len - 3, top);
        } else {
            let clone = arena.clone_entry(top);
            arena.get_mut(clone).split = true;
            frame.stack.insert(len - 3, clone);
        }
    }
}

fn step_dup2(frame: &mut Frame) {
    let len = frame.stack.len();
    if len >= 2 {
        let a = frame.stack[len - 2];
        let b = frame.stack[len - 1];
        frame.stack.push(a);
        frame.stack.push(b);
    }
}

fn step_dup2_x1(frame: &mut Frame) {
    let len = frame.stack.len();
    if len >= 3 {
        let a = frame.stack[len - 2];
        let b = frame.stack[len - 1];
        frame.stack.insert(len - 3, a);
        frame.stack.insert(len - 2, b);
    }
}

fn step_dup2_x2(frame: &mut Frame) {
    let len = frame.stack.len();
    if len >= 4 {
        let a = frame.stack[len - 2];
        let b = frame.stack[len - 1];
        frame.stack.insert(len - 4, a);
        frame.stack.insert(len - 3, b);
    }
}

/// Exchanging the top two stack words is only safe when both are whole
/// one-word values. If either belongs to a two-word value (its own type is
/// category 2, or it is the hidword marker of one), the exchange would
/// separate that value's halves, so both entries are marked `split` first
/// (see `Entry::split`) before the physical swap.
fn step_swap(frame: &mut Frame, arena: &mut EntryArena) {
    let len = frame.stack.len();
    if len >= 2 {
        let top = frame.stack[len - 1];
        let below = frame.stack[len - 2];
        if is_two_word(arena, top) || is_two_word(arena, below) {
            arena.get_mut(top).split = true;
            arena.get_mut(below).split = true;
        }
        frame.stack.swap(len - 1, len - 2);
    }
}

fn is_two_word(arena: &EntryArena, id: EntryId) -> bool {
    let entry = arena.get(id);
    entry.hidword || entry.ty.is_category2()
}

fn resolve_field_descriptor(pool: &ConstantPool, index: u16) -> Result<FieldType> {
    let Constant::FieldRef { name_and_type_index, .. } = pool.try_get(index)? else {
        return Err(InvalidConstantPoolIndexType(index));
    };
    let Constant::NameAndType { descriptor_index, .. } = pool.try_get(*name_and_type_index)? else {
        return Err(InvalidConstantPoolIndexType(*name_and_type_index));
    };
    let descriptor = pool.try_get_utf8(*descriptor_index)?.to_string();
    FieldType::parse(&descriptor)
}

fn resolve_method_descriptor(pool: &ConstantPool, index: u16) -> Result<(String, String, String)> {
    let (class_index, name_and_type_index) = match pool.try_get(index)? {
        Constant::MethodRef { class_index, name_and_type_index }
        | Constant::InterfaceMethodRef { class_index, name_and_type_index } => (*class_index, *name_and_type_index),
        _ => return Err(InvalidConstantPoolIndexType(index)),
    };
    let class_name = pool.try_get_class(class_index)?.to_string();
    let Constant::NameAndType { name_index, descriptor_index } = pool.try_get(name_and_type_index)? else {
        return Err(InvalidConstantPoolIndexType(name_and_type_index));
    };
    let name = pool.try_get_utf8(*name_index)?.to_string();
    let descriptor = pool.try_get_utf8(*descriptor_index)?.to_string();
    Ok((class_name, name, descriptor))
}

fn resolve_invoke_dynamic_descriptor(pool: &ConstantPool, index: u16) -> Result<String> {
    let Constant::InvokeDynamic { name_and_type_index, .. } = pool.try_get(index)? else {
        return Err(InvalidConstantPoolIndexType(index));
    };
    let Constant::NameAndType { descriptor_index, .. } = pool.try_get(*name_and_type_index)? else {
        return Err(InvalidConstantPoolIndexType(*name_and_type_index));
    };
    Ok(pool.try_get_utf8(*descriptor_index)?.to_string())
}

fn step_invoke(
    frame: &mut Frame,
    arena: &mut EntryArena,
    interner: &Interner,
    descriptor: &str,
    has_receiver: bool,
    offset: u32,
) -> Result<()> {
    let (parameters, return_type) = FieldType::parse_method_descriptor(descriptor)?;
    for parameter in parameters.iter().rev() {
        let ty = Type::from_field_type(parameter, interner);
        frame.pop_expect(arena, &ty, offset)?;
    }
    if has_receiver {
        frame.pop_expect(arena, &Type::object(interner), offset)?;
    }
    if let Some(return_type) = return_type {
        let ty = Type::from_field_type(&return_type, interner);
        frame.push(arena, ty, Some(offset));
    }
    Ok(())
}

/// The `invokespecial <init>` replacement: pops constructor arguments and
/// the `Uninitialized` receiver, then rewrites every alias of that
/// receiver — in the stack and in locals — to the now-initialized class
/// type. See SPEC_FULL.md §4.2.
fn step_invoke_init(
    frame: &mut Frame,
    arena: &mut EntryArena,
    interner: &Interner,
    class_name: &str,
    descriptor: &str,
    offset: u32,
) -> Result<()> {
    let (parameters, _) = FieldType::parse_method_descriptor(descriptor)?;
    for parameter in parameters.iter().rev() {
        let ty = Type::from_field_type(parameter, interner);
        frame.pop_expect(arena, &ty, offset)?;
    }
    let Some(receiver) = frame.pop(arena) else {
        return Err(crate::Error::ShortRead { expected: 1, actual: 0 });
    };
    let initialized = Type::Reference(Ref::Class(interner.intern(class_name)));
    frame.replace(arena, receiver, initialized);
    Ok(())
}

fn step_wide(
    wide: &WideInstruction,
    frame: &mut Frame,
    arena: &mut EntryArena,
    offset: u32,
    context: &Context,
) -> Result<()> {
    match wide {
        WideInstruction::Iload(index) => step_load(frame, arena, *index, Type::Int),
        WideInstruction::Lload(index) => step_load(frame, arena, *index, Type::Long),
        WideInstruction::Fload(index) => step_load(frame, arena, *index, Type::Float),
        WideInstruction::Dload(index) => step_load(frame, arena, *index, Type::Double),
        WideInstruction::Aload(index) => {
            if let Some(id) = frame.load(*index) {
                push_loaded(frame, arena, id);
            }
        }
        WideInstruction::Istore(index) => step_store(frame, arena, *index, &Type::Int, offset)?,
        WideInstruction::Lstore(index) => step_store(frame, arena, *index, &Type::Long, offset)?,
        WideInstruction::Fstore(index) => step_store(frame, arena, *index, &Type::Float, offset)?,
        WideInstruction::Dstore(index) => step_store(frame, arena, *index, &Type::Double, offset)?,
        WideInstruction::Astore(index) => step_store_ref(frame, arena, *index)?,
        WideInstruction::Ret(_) => {}
        WideInstruction::Iinc(index, value) => {
            step_iinc(frame, arena, *index, i32::from(*value), context);
        }
    }
    Ok(())
}
