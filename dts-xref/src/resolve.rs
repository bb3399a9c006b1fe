//! Phandle resolution and cell-list decoding.

use std::cell::OnceCell;
use std::collections::HashMap;

use log::debug;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, hex_digit1, multispace0},
    combinator::{all_consuming, map_res},
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};

use crate::tree::{NodeId, Tree};

/// Identification property used to label controllers and detect the platform.
pub const COMPATIBLE: &str = "compatible";

/// Decode a cell list value such as `<0x5 0x18 0x0>`.
///
/// Returns `None` unless the whole value is a single `< … >` group of hexadecimal
/// (`0x`-prefixed) or decimal cells.
pub fn cells(value: &str) -> Option<Vec<u32>> {
    all_consuming(delimited(
        lexeme(char('<')),
        many0(lexeme(cell)),
        lexeme(char('>')),
    ))(value)
    .ok()
    .map(|(_, cells)| cells)
}

/// Split a consumer property such as `gpios = <0x5 0x18 0x0 0x5 0x19 0x0>` into
/// `[phandle, arg1, arg2]` specifiers.
///
/// Every specifier must reference `phandle` and have exactly two arguments.
pub fn specifier_triples(value: &str, phandle: u32) -> Option<Vec<[u32; 3]>> {
    let cells = cells(value)?;
    if cells.is_empty() || cells.len() % 3 != 0 {
        return None;
    }

    cells
        .chunks_exact(3)
        .map(|c| (c[0] == phandle).then_some([c[0], c[1], c[2]]))
        .collect()
}

/// Cross-reference lookups over a parsed tree.
pub struct Resolver<'t> {
    tree: &'t Tree,
    phandles: OnceCell<HashMap<u32, NodeId>>,
}

impl<'t> Resolver<'t> {
    pub fn new(tree: &'t Tree) -> Self {
        Self {
            tree,
            phandles: OnceCell::new(),
        }
    }

    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    /// The `phandle` value of a node, if it carries a single-cell one.
    pub fn phandle_of(&self, id: NodeId) -> Option<u32> {
        match cells(self.tree.node(id).prop("phandle")?)?.as_slice() {
            &[phandle] => Some(phandle),
            _ => None,
        }
    }

    /// The first node, in pre-order, whose `phandle` equals `phandle`.
    pub fn resolve_phandle(&self, phandle: u32) -> Option<NodeId> {
        let found = self
            .phandles
            .get_or_init(|| {
                let mut map = HashMap::new();
                for id in self.tree.descendants(self.tree.root()) {
                    if let Some(phandle) = self.phandle_of(id) {
                        map.entry(phandle).or_insert(id);
                    }
                }
                map
            })
            .get(&phandle)
            .copied();

        if found.is_none() {
            debug!("node with phandle = <{phandle:#x}> is not found");
        }
        found
    }

    /// `id` itself if it has a `compatible` property, else its closest ancestor that does.
    pub fn nearest_identified_ancestor(&self, id: NodeId) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.tree.ancestors(id))
            .find(|&n| self.tree.node(n).prop(COMPATIBLE).is_some())
    }
}

fn cell(input: &str) -> IResult<&str, u32> {
    alt((hex, dec))(input)
}

fn hex(input: &str) -> IResult<&str, u32> {
    map_res(preceded(alt((tag("0x"), tag("0X"))), hex_digit1), |s| {
        u32::from_str_radix(s, 16)
    })(input)
}

fn dec(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse::<u32>)(input)
}

fn lexeme<'a, O, F>(f: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, f, multispace0)
}
