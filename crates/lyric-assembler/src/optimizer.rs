//! Peephole optimization of proc code.
//!
//! Runs on symbolic fragments, before layout, so removing instructions
//! never invalidates a branch. Three rewrites repeat until nothing changes:
//! integer and float constant folding, removal of unreachable instructions
//! after a terminator, and removal of jumps to the next instruction.

use std::collections::HashSet;

use lyric_object::Opcode;

use crate::code::{CodeFragment, FragmentItem, Label, PendingOperand};
use crate::proc_handle::ProcHandle;

/// Optimize the code of one proc in place.
pub fn optimize_proc(proc: &mut ProcHandle) {
    let mut keep: HashSet<Label> = HashSet::new();
    for check in proc.checks() {
        keep.insert(check.start);
        keep.insert(check.end);
        for catch in &check.catches {
            keep.insert(catch.start);
            keep.insert(catch.end);
        }
    }
    let code = proc.replace_code(CodeFragment::new());
    proc.replace_code(optimize_fragment(code, &keep));
}

/// Optimize a fragment. Labels in `keep` are entry points besides jumps.
pub fn optimize_fragment(code: CodeFragment, keep: &HashSet<Label>) -> CodeFragment {
    let mut items = code.flatten();
    loop {
        let before = items.len();
        items.retain(|item| !matches!(item, FragmentItem::Op { opcode: Opcode::Noop, .. }));
        fold_constants(&mut items);
        remove_unreachable(&mut items, keep);
        remove_jumps_to_next(&mut items);
        if items.len() == before {
            break;
        }
    }
    CodeFragment::from_items(items)
}

fn constant(item: &FragmentItem) -> Option<Constant> {
    match item {
        FragmentItem::Op {
            opcode: Opcode::I64,
            operand: PendingOperand::I64(v),
        } => Some(Constant::I64(*v)),
        FragmentItem::Op {
            opcode: Opcode::Dbl,
            operand: PendingOperand::Dbl(v),
        } => Some(Constant::Dbl(*v)),
        _ => None,
    }
}

#[derive(Clone, Copy)]
enum Constant {
    I64(i64),
    Dbl(f64),
}

impl Constant {
    fn into_item(self) -> FragmentItem {
        match self {
            Constant::I64(v) => FragmentItem::Op {
                opcode: Opcode::I64,
                operand: PendingOperand::I64(v),
            },
            Constant::Dbl(v) => FragmentItem::Op {
                opcode: Opcode::Dbl,
                operand: PendingOperand::Dbl(v),
            },
        }
    }
}

fn opcode(item: &FragmentItem) -> Option<Opcode> {
    match item {
        FragmentItem::Op { opcode, .. } => Some(*opcode),
        _ => None,
    }
}

/// Integer folds that would overflow or divide by zero are left for the
/// runtime, which raises the matching status.
fn fold_binary(op: Opcode, lhs: Constant, rhs: Constant) -> Option<Constant> {
    match (op, lhs, rhs) {
        (Opcode::I64Add, Constant::I64(a), Constant::I64(b)) => a.checked_add(b).map(Constant::I64),
        (Opcode::I64Sub, Constant::I64(a), Constant::I64(b)) => a.checked_sub(b).map(Constant::I64),
        (Opcode::I64Mul, Constant::I64(a), Constant::I64(b)) => a.checked_mul(b).map(Constant::I64),
        (Opcode::I64Div, Constant::I64(a), Constant::I64(b)) => a.checked_div(b).map(Constant::I64),
        (Opcode::DblAdd, Constant::Dbl(a), Constant::Dbl(b)) => Some(Constant::Dbl(a + b)),
        (Opcode::DblSub, Constant::Dbl(a), Constant::Dbl(b)) => Some(Constant::Dbl(a - b)),
        (Opcode::DblMul, Constant::Dbl(a), Constant::Dbl(b)) => Some(Constant::Dbl(a * b)),
        (Opcode::DblDiv, Constant::Dbl(a), Constant::Dbl(b)) => Some(Constant::Dbl(a / b)),
        _ => None,
    }
}

fn fold_unary(op: Opcode, value: Constant) -> Option<Constant> {
    match (op, value) {
        (Opcode::I64Neg, Constant::I64(a)) => a.checked_neg().map(Constant::I64),
        (Opcode::DblNeg, Constant::Dbl(a)) => Some(Constant::Dbl(-a)),
        _ => None,
    }
}

fn fold_constants(items: &mut Vec<FragmentItem>) {
    let mut out: Vec<FragmentItem> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if let Some(op) = opcode(&item) {
            let n = out.len();
            if n >= 2
                && let (Some(lhs), Some(rhs)) = (constant(&out[n - 2]), constant(&out[n - 1]))
                && let Some(folded) = fold_binary(op, lhs, rhs)
            {
                out.truncate(n - 2);
                out.push(folded.into_item());
                continue;
            }
            if n >= 1
                && let Some(value) = constant(&out[n - 1])
                && let Some(folded) = fold_unary(op, value)
            {
                out.truncate(n - 1);
                out.push(folded.into_item());
                continue;
            }
        }
        out.push(item);
    }
    *items = out;
}

fn remove_unreachable(items: &mut Vec<FragmentItem>, keep: &HashSet<Label>) {
    let targets: HashSet<Label> = items
        .iter()
        .filter_map(|item| match item {
            FragmentItem::Jump { target, .. } => Some(*target),
            _ => None,
        })
        .chain(keep.iter().copied())
        .collect();

    let mut reachable = true;
    items.retain(|item| match item {
        FragmentItem::Label(label) => {
            if targets.contains(label) {
                reachable = true;
            }
            reachable || keep.contains(label)
        }
        FragmentItem::Op { opcode, .. } | FragmentItem::Jump { opcode, .. } => {
            let keep_item = reachable;
            if reachable && opcode.is_terminator() {
                reachable = false;
            }
            keep_item
        }
        FragmentItem::Fragment(_) => reachable,
    });
}

fn remove_jumps_to_next(items: &mut Vec<FragmentItem>) {
    let mut i = 0;
    while i < items.len() {
        if let FragmentItem::Jump {
            opcode: Opcode::Jump,
            target,
        } = &items[i]
        {
            let target = *target;
            let falls_into = items[i + 1..]
                .iter()
                .take_while(|item| matches!(item, FragmentItem::Label(_)))
                .any(|item| *item == FragmentItem::Label(target));
            if falls_into {
                items.remove(i);
                continue;
            }
        }
        i += 1;
    }
}
