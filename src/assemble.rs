//! Reassembles a [`crate::graph::Graph`] back into a method's raw bytecode.
//!
//! Grounded on `attributes/instruction_utils.rs`'s `instructions_to_bytes`
//! (encode each instruction into one growing buffer, in order) and
//! `offset_utils.rs`'s offset bookkeeping, generalized from "reproduce the
//! offsets that decoding already agreed on" to "recompute every branch and
//! switch offset against a new layout", since a caller may have edited the
//! graph's blocks or edges before asking for bytes back. Blocks are laid out
//! in ascending label order; when that leaves a `Fallthrough` edge pointing
//! at a block it doesn't immediately precede, a synthetic `goto` is spliced
//! in to preserve the edge's meaning.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::Error::WriteFailed;
use crate::error::Result;
use crate::graph::{EdgeKind, Graph, OPAQUE, RETHROW, RETURN};
use crate::instruction::{Instruction, LookupSwitch, TableSwitch};
use crate::pool::ConstantPool;

#[derive(Debug)]
enum Planned {
    Existing(i32, Instruction),
    SyntheticGoto(i32),
}

/// Reassembles `graph` into a flat instruction stream.
///
/// # Errors
/// Returns [`crate::Error::WriteFailed`] if a branch or switch target can't
/// be resolved in the new layout, or a recomputed delta no longer fits the
/// instruction's operand width. Returns [`crate::Error::InvalidConstantPoolIndex`]
/// (or the matching tag-mismatch variant) if an instruction references a
/// `pool` index that doesn't resolve.
pub fn assemble(graph: &Graph, pool: &ConstantPool) -> Result<Vec<u8>> {
    let blocks: Vec<_> = graph.blocks().filter(|block| !block.is_special()).collect();

    let mut planned: Vec<Planned> = Vec::new();
    for (index, block) in blocks.iter().enumerate() {
        for (_, instruction) in &block.instructions {
            planned.push(Planned::Existing(block.label, instruction.clone()));
        }
        let next_label = blocks.get(index + 1).map(|block| block.label);
        if let Some(target) = fallthrough_gap(graph, block.label, next_label) {
            planned.push(Planned::SyntheticGoto(target));
        }
    }

    let mut offsets = Vec::with_capacity(planned.len());
    let mut running = 0u32;
    for item in &planned {
        offsets.push(running);
        running += planned_size(item, running)?;
    }

    let mut label_offsets: HashMap<i32, u32> = HashMap::new();
    for (item, &offset) in planned.iter().zip(&offsets) {
        if let Planned::Existing(label, _) = item {
            label_offsets.entry(*label).or_insert(offset);
        }
    }

    let mut bytes = Vec::with_capacity(running as usize);
    for (item, &offset) in planned.iter().zip(&offsets) {
        let instruction = match item {
            Planned::Existing(label, instruction) => {
                validate_pool_refs(instruction, pool)?;
                patch_branch(instruction, *label, offset, graph, &label_offsets)?
            }
            Planned::SyntheticGoto(target) => {
                let target_offset = *label_offsets
                    .get(target)
                    .ok_or_else(|| WriteFailed(format!("synthetic goto has no resolvable target block {target}")))?;
                let delta = i64::from(target_offset) - i64::from(offset);
                let delta = i16::try_from(delta)
                    .map_err(|_| WriteFailed(format!("synthetic goto delta {delta} out of i16 range")))?;
                Instruction::Goto(delta)
            }
        };
        instruction.encode(&mut bytes)?;
    }

    Ok(bytes)
}

/// If `label`'s `Fallthrough` edge (if any) targets a real block other than
/// `next_label`, returns that target so the caller can splice in a `goto`.
fn fallthrough_gap(graph: &Graph, label: i32, next_label: Option<i32>) -> Option<i32> {
    let to = graph.out_edges(label).into_iter().find(|edge| matches!(edge.kind, EdgeKind::Fallthrough))?.to;
    if to == RETURN || to == RETHROW || to == OPAQUE || Some(to) == next_label {
        None
    } else {
        Some(to)
    }
}

fn planned_size(item: &Planned, offset: u32) -> Result<u32> {
    match item {
        Planned::Existing(_, instruction) => instruction_size(instruction, offset),
        Planned::SyntheticGoto(_) => Ok(3),
    }
}

/// The encoded byte length of `instruction` at `offset`. Independent of
/// `offset` for every opcode except `tableswitch`/`lookupswitch`, whose
/// padding aligns to a 4-byte boundary measured from the start of the code
/// array (JVMS 6.5 `tableswitch`/`lookupswitch`).
fn instruction_size(instruction: &Instruction, offset: u32) -> Result<u32> {
    match instruction {
        Instruction::Tableswitch(table_switch) => {
            let pad = (4 - (offset + 1) % 4) % 4;
            Ok(1 + pad + 12 + 4 * u32::try_from(table_switch.offsets.len())?)
        }
        Instruction::Lookupswitch(lookup_switch) => {
            let pad = (4 - (offset + 1) % 4) % 4;
            Ok(1 + pad + 8 + 8 * u32::try_from(lookup_switch.pairs.len())?)
        }
        other => {
            let mut scratch = Vec::new();
            other.encode(&mut scratch)?;
            Ok(u32::try_from(scratch.len())?)
        }
    }
}

/// Resolves the new delta from `offset` to block `to`, or `None` if `to` is
/// the unresolved-target sink (in which case the original, already-malformed
/// delta is best left untouched rather than invented).
fn resolve_delta(to: i32, offset: u32, label_offsets: &HashMap<i32, u32>) -> Result<Option<i64>> {
    if to == OPAQUE {
        return Ok(None);
    }
    let target_offset =
        *label_offsets.get(&to).ok_or_else(|| WriteFailed(format!("branch target block {to} missing from new layout")))?;
    Ok(Some(i64::from(target_offset) - i64::from(offset)))
}

fn single_jump_target(graph: &Graph, label: i32) -> Option<i32> {
    graph.out_edges(label).into_iter().find(|edge| matches!(edge.kind, EdgeKind::Jump)).map(|edge| edge.to)
}

fn patch_branch(
    instruction: &Instruction,
    label: i32,
    offset: u32,
    graph: &Graph,
    label_offsets: &HashMap<i32, u32>,
) -> Result<Instruction> {
    match instruction {
        Instruction::Ifeq(_)
        | Instruction::Ifne(_)
        | Instruction::Iflt(_)
        | Instruction::Ifge(_)
        | Instruction::Ifgt(_)
        | Instruction::Ifle(_)
        | Instruction::If_icmpeq(_)
        | Instruction::If_icmpne(_)
        | Instruction::If_icmplt(_)
        | Instruction::If_icmpge(_)
        | Instruction::If_icmpgt(_)
        | Instruction::If_icmple(_)
        | Instruction::If_acmpeq(_)
        | Instruction::If_acmpne(_)
        | Instruction::Goto(_)
        | Instruction::Jsr(_)
        | Instruction::Ifnull(_)
        | Instruction::Ifnonnull(_) => {
            let Some(to) = single_jump_target(graph, label) else { return Ok(instruction.clone()) };
            let Some(delta) = resolve_delta(to, offset, label_offsets)? else { return Ok(instruction.clone()) };
            let delta = i16::try_from(delta)
                .map_err(|_| WriteFailed(format!("branch delta {delta} out of i16 range at offset {offset}")))?;
            Ok(rebuild_short_branch(instruction, delta))
        }
        Instruction::Goto_w(_) | Instruction::Jsr_w(_) => {
            let Some(to) = single_jump_target(graph, label) else { return Ok(instruction.clone()) };
            let Some(delta) = resolve_delta(to, offset, label_offsets)? else { return Ok(instruction.clone()) };
            let delta = i32::try_from(delta)
                .map_err(|_| WriteFailed(format!("branch delta {delta} out of i32 range at offset {offset}")))?;
            Ok(match instruction {
                Instruction::Jsr_w(_) => Instruction::Jsr_w(delta),
                _ => Instruction::Goto_w(delta),
            })
        }
        Instruction::Tableswitch(table_switch) => {
            Ok(Instruction::Tableswitch(patch_table_switch(table_switch, label, offset, graph, label_offsets)?))
        }
        Instruction::Lookupswitch(lookup_switch) => {
            Ok(Instruction::Lookupswitch(patch_lookup_switch(lookup_switch, label, offset, graph, label_offsets)?))
        }
        other => Ok(other.clone()),
    }
}

fn rebuild_short_branch(instruction: &Instruction, delta: i16) -> Instruction {
    match instruction {
        Instruction::Ifeq(_) => Instruction::Ifeq(delta),
        Instruction::Ifne(_) => Instruction::Ifne(delta),
        Instruction::Iflt(_) => Instruction::Iflt(delta),
        Instruction::Ifge(_) => Instruction::Ifge(delta),
        Instruction::Ifgt(_) => Instruction::Ifgt(delta),
        Instruction::Ifle(_) => Instruction::Ifle(delta),
        Instruction::If_icmpeq(_) => Instruction::If_icmpeq(delta),
        Instruction::If_icmpne(_) => Instruction::If_icmpne(delta),
        Instruction::If_icmplt(_) => Instruction::If_icmplt(delta),
        Instruction::If_icmpge(_) => Instruction::If_icmpge(delta),
        Instruction::If_icmpgt(_) => Instruction::If_icmpgt(delta),
        Instruction::If_icmple(_) => Instruction::If_icmple(delta),
        Instruction::If_acmpeq(_) => Instruction::If_acmpeq(delta),
        Instruction::If_acmpne(_) => Instruction::If_acmpne(delta),
        Instruction::Goto(_) => Instruction::Goto(delta),
        Instruction::Jsr(_) => Instruction::Jsr(delta),
        Instruction::Ifnull(_) => Instruction::Ifnull(delta),
        Instruction::Ifnonnull(_) => Instruction::Ifnonnull(delta),
        other => other.clone(),
    }
}

fn patch_table_switch(
    table_switch: &TableSwitch,
    label: i32,
    offset: u32,
    graph: &Graph,
    label_offsets: &HashMap<i32, u32>,
) -> Result<TableSwitch> {
    let mut default = table_switch.default;
    let mut offsets = table_switch.offsets.clone();
    for edge in graph.out_edges(label) {
        let EdgeKind::Switch { key } = &edge.kind else { continue };
        let Some(delta) = resolve_delta(edge.to, offset, label_offsets)? else { continue };
        let delta =
            i32::try_from(delta).map_err(|_| WriteFailed(format!("switch delta {delta} out of i32 range at offset {offset}")))?;
        match key {
            None => default = delta,
            Some(key) => {
                let position = usize::try_from(*key - table_switch.low)
                    .map_err(|_| WriteFailed(format!("switch key {key} out of table range at offset {offset}")))?;
                if let Some(slot) = offsets.get_mut(position) {
                    *slot = delta;
                }
            }
        }
    }
    Ok(TableSwitch { default, low: table_switch.low, high: table_switch.high, offsets })
}

fn patch_lookup_switch(
    lookup_switch: &LookupSwitch,
    label: i32,
    offset: u32,
    graph: &Graph,
    label_offsets: &HashMap<i32, u32>,
) -> Result<LookupSwitch> {
    let mut default = lookup_switch.default;
    let mut pairs: IndexMap<i32, i32> = lookup_switch.pairs.clone();
    for edge in graph.out_edges(label) {
        let EdgeKind::Switch { key } = &edge.kind else { continue };
        let Some(delta) = resolve_delta(edge.to, offset, label_offsets)? else { continue };
        let delta =
            i32::try_from(delta).map_err(|_| WriteFailed(format!("switch delta {delta} out of i32 range at offset {offset}")))?;
        match key {
            None => default = delta,
            Some(key) => {
                if let Some(slot) = pairs.get_mut(key) {
                    *slot = delta;
                }
            }
        }
    }
    Ok(LookupSwitch { default, pairs })
}

/// Eagerly resolves every constant-pool index an instruction carries, so a
/// bad index surfaces as a clean error here instead of silently producing
/// bytecode that references garbage.
fn validate_pool_refs(instruction: &Instruction, pool: &ConstantPool) -> Result<()> {
    let index = match instruction {
        Instruction::Ldc(index) => Some(u16::from(*index)),
        Instruction::Ldc_w(index)
        | Instruction::Ldc2_w(index)
        | Instruction::Getstatic(index)
        | Instruction::Putstatic(index)
        | Instruction::Getfield(index)
        | Instruction::Putfield(index)
        | Instruction::Invokevirtual(index)
        | Instruction::Invokespecial(index)
        | Instruction::Invokestatic(index)
        | Instruction::Invokeinterface(index, _)
        | Instruction::Invokedynamic(index)
        | Instruction::New(index)
        | Instruction::Anewarray(index)
        | Instruction::Checkcast(index)
        | Instruction::Instanceof(index)
        | Instruction::Multianewarray(index, _) => Some(*index),
        _ => None,
    };
    if let Some(index) = index {
        pool.try_get(index)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Block, Edge, disassemble};
    use crate::method::{Code, MethodAccessFlags, MethodInfo};
    use std::collections::BTreeMap;

    fn method_with_code(code: Vec<u8>) -> MethodInfo {
        MethodInfo::new("Example", "run", MethodAccessFlags::STATIC, "()V").expect("descriptor").with_code(Code::new(2, 1, code))
    }

    #[test]
    fn test_straight_line_round_trip() -> Result<()> {
        let code = vec![
            0xb2, 0x00, 0x07, // getstatic #7
            0x12, 0x13, // ldc #19
            0xb6, 0x00, 0x19, // invokevirtual #25
            0xb1, // return
        ];
        let method = method_with_code(code.clone());
        let graph = disassemble(&method)?;
        let mut pool = ConstantPool::new();
        while pool.len() < 26 {
            pool.add_utf8(format!("filler{}", pool.len()))?;
        }
        let rebuilt = assemble(&graph, &pool)?;
        assert_eq!(code, rebuilt);
        Ok(())
    }

    #[test]
    fn test_conditional_branch_round_trip_preserves_deltas() -> Result<()> {
        let code = vec![
            0x1a, // iload_0 (0)
            0x99, 0x00, 0x04, // ifeq +4 -> offset 5 (1)
            0x03, // iconst_0 (4)
            0xac, // ireturn (5)
            0x04, // iconst_1 (6)
            0xac, // ireturn (7)
        ];
        let method = method_with_code(code.clone());
        let graph = disassemble(&method)?;
        let pool = ConstantPool::new();
        let rebuilt = assemble(&graph, &pool)?;
        assert_eq!(code, rebuilt);
        Ok(())
    }

    #[test]
    fn test_tableswitch_round_trip() -> Result<()> {
        let mut code = vec![0xaa]; // tableswitch (offset 0)
        while code.len() % 4 != 0 {
            code.push(0);
        }
        // instruction body runs from offset 0 to offset 24 (1 + 3 pad + 12 + 8)
        code.extend_from_slice(&26i32.to_be_bytes()); // default -> offset 26
        code.extend_from_slice(&0i32.to_be_bytes()); // low
        code.extend_from_slice(&1i32.to_be_bytes()); // high
        code.extend_from_slice(&24i32.to_be_bytes()); // case 0 -> offset 24
        code.extend_from_slice(&25i32.to_be_bytes()); // case 1 -> offset 25
        code.push(0xb1); // return (24, case 0 target)
        code.push(0xb1); // return (25, case 1 target)
        code.push(0xb1); // return (26, default target)
        let method = method_with_code(code.clone());
        let graph = disassemble(&method)?;
        let pool = ConstantPool::new();
        let rebuilt = assemble(&graph, &pool)?;
        assert_eq!(code, rebuilt);
        Ok(())
    }

    #[test]
    fn test_out_of_order_blocks_insert_synthetic_goto() -> Result<()> {
        // Block -1 (entry) falls into block 0; block 0 naturally falls into
        // block 1, but is hand-labeled to fall into block 2 instead, so the
        // assembler must splice in a goto to reach it.
        let mut blocks = BTreeMap::new();
        blocks.insert(0, Block { label: 0, instructions: vec![(0, Instruction::Iconst_0)] });
        blocks.insert(1, Block { label: 1, instructions: vec![(1, Instruction::Iconst_1), (2, Instruction::Pop)] });
        blocks.insert(2, Block { label: 2, instructions: vec![(3, Instruction::Return)] });
        let edges = vec![
            Edge { from: 0, to: 2, kind: EdgeKind::Fallthrough },
            Edge { from: 1, to: 2, kind: EdgeKind::Fallthrough },
        ];
        let graph = Graph::for_test(blocks, edges);
        let pool = ConstantPool::new();
        let bytes = assemble(&graph, &pool)?;
        // block 0 (iconst_0 @0) + synthetic goto (@1, delta 5 -> offset 6) +
        // block 1 (iconst_1, pop @4,5) + block 2 (return @6)
        assert_eq!(vec![0x03, 0xa7, 0x00, 0x05, 0x04, 0x57, 0xb1], bytes);
        Ok(())
    }

    #[test]
    fn test_invalid_pool_index_is_rejected() -> Result<()> {
        let code = vec![0xb8, 0x00, 0x05, 0xb1]; // invokestatic #5 (out of range), return
        let method = method_with_code(code);
        let graph = disassemble(&method)?;
        let pool = ConstantPool::new();
        assert!(assemble(&graph, &pool).is_err());
        Ok(())
    }
}
