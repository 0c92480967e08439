//! Falling-block behavior for sand and gravel.

use cobble_defs::block;

use super::{BlockChange, World};

pub(super) fn update(world: &mut World, x: i16, y: i16, z: i16, block_id: u8, changes: &mut Vec<BlockChange>) {
    if block::is_falling(block_id) {
        fall(world, x, y, z, block_id, changes);
    }
}

/// Drops the block down its air column, clearing each vacated cell, then
/// re-examines the cell above the original position so a stacked column
/// follows the block down one by one.
fn fall(world: &mut World, x: i16, y: i16, z: i16, block_id: u8, changes: &mut Vec<BlockChange>) {
    let mut dy = y - 1;
    while world.get_block(x, dy, z).is_ok_and(|b| b == block::AIR) {
        change(world, x, dy, z, block_id, changes);
        if world.get_block(x, dy + 1, z).is_ok_and(|b| b == block_id) {
            change(world, x, dy + 1, z, block::AIR, changes);
        }
        dy -= 1;
    }

    let above = y + 1;
    if !World::in_range(x, above, z) {
        return;
    }
    let Ok(next) = world.get_block(x, above, z) else {
        return;
    };
    if block::is_falling(next) {
        fall(world, x, above, z, next, changes);
    }
}

fn change(world: &mut World, x: i16, y: i16, z: i16, block_id: u8, changes: &mut Vec<BlockChange>) {
    // raw write so the follow-up edit can't re-enter physics
    let _ = world.set_block_raw(x, y, z, block_id);
    changes.push(BlockChange {
        x,
        y,
        z,
        block: block_id,
    });
}
