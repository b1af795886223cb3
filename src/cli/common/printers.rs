// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Pretty printers for reporting information. Lines are grouped into blocks
//! and drawn as a tree under a bold title.

use std::{borrow::Cow, sync::Mutex};

use log::Level;

const VERTICAL: char = '│';
const UP_AND_RIGHT: char = '└';
const VERTICAL_AND_RIGHT: char = '├';

type Block = Vec<Cow<'static, str>>;

lazy_static::lazy_static! {
    static ref DEFERRED_WARNINGS: Mutex<Vec<Block>> = Mutex::new(vec![]);
}

/// The symbol in front of a line; only the first line of a block gets a
/// branch.
fn tree_symbol(i_line: usize, is_last_line: bool, is_last_block: bool) -> char {
    match (i_line, is_last_line, is_last_block) {
        (0, true, true) => UP_AND_RIGHT,
        (0, _, _) => VERTICAL_AND_RIGHT,
        _ => VERTICAL,
    }
}

fn draw(level: Level, title: &str, blocks: &[Block]) {
    log::log!(level, "{}", console::style(title).bold());
    for (i_block, block) in blocks.iter().enumerate() {
        let is_last_block = i_block + 1 == blocks.len();
        for (i_line, line) in block.iter().enumerate() {
            let symbol = tree_symbol(i_line, i_line + 1 == block.len(), is_last_block);
            log::log!(level, "{symbol} {line}");
        }
    }
    log::log!(level, "");
}

pub(crate) struct InfoPrinter {
    title: Cow<'static, str>,
    blocks: Vec<Block>,
}

impl InfoPrinter {
    pub(crate) fn new(title: Cow<'static, str>) -> Self {
        Self {
            title,
            blocks: vec![],
        }
    }

    pub(crate) fn push_line(&mut self, line: Cow<'static, str>) {
        self.blocks.push(vec![line]);
    }

    pub(crate) fn push_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub(crate) fn display(self) {
        draw(Level::Info, &self.title, &self.blocks);
    }
}

/// Something that can be shown as a warning after argument parsing is done.
pub(crate) trait Warn {
    fn warn(self);
}

fn defer(block: Block) {
    if let Ok(mut warnings) = DEFERRED_WARNINGS.lock() {
        warnings.push(block);
    }
}

impl Warn for &'static str {
    fn warn(self) {
        defer(vec![self.into()]);
    }
}

impl Warn for String {
    fn warn(self) {
        defer(vec![self.into()]);
    }
}

impl Warn for Cow<'static, str> {
    fn warn(self) {
        defer(vec![self]);
    }
}

impl Warn for Block {
    fn warn(self) {
        defer(self);
    }
}

/// Print out any warnings that have been collected as CLI arguments have been
/// parsed. This should only be called once before all arguments have been
/// parsed into parameters.
pub(crate) fn display_warnings() {
    log::debug!("Displaying warnings");
    if let Ok(mut warnings) = DEFERRED_WARNINGS.lock() {
        if !warnings.is_empty() {
            draw(Level::Warn, "Warnings", &warnings);
            warnings.clear();
        }
    }
}
