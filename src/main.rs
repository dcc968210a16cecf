#[macro_use]
extern crate log;
extern crate simplelog;

use flash_ftl::config::*;
use flash_ftl::{Ftl, MemFlash};
use rand::prelude::*;
use simplelog::*;
use time::macros::format_description;

fn main() -> flash_ftl::Result<()> {
    let log_cfg = ConfigBuilder::new()
        .set_time_format_custom(format_description!("[hour]:[minute]:[second].[subsecond]"))
        .build();

    if let Err(e) = SimpleLogger::init(LevelFilter::Debug, log_cfg) {
        eprintln!("logger already installed: {}", e);
    }

    let flash = MemFlash::new(BLOCKS, PAGES_PER_BLOCK, PAGE_SIZE);
    let mut fw = Ftl::new(flash, FtlConfig::with_op(ALL_PAGES, DEFAULT_OP))?;
    let max_lba = fw.max_lba();

    for i in 0..=max_lba {
        fw.write(i, &stamp(i, 0))?;
    }
    info!("Drive preconditioned");

    let mut rng: SmallRng = SmallRng::seed_from_u64(7);
    let mut generation = vec![0u8; max_lba + 1];

    for c in 0..4 {
        for _ in 0..=max_lba {
            let lba = rng.gen_range(0..=max_lba);
            generation[lba] = generation[lba].wrapping_add(1);
            fw.write(lba, &stamp(lba, generation[lba]))?;
        }
        info!("Capacity {} randomly written", c);
    }

    for lba in 0..=max_lba {
        if fw.read(lba)? != stamp(lba, generation[lba]) {
            error!("Logical block {} returned stale data", lba);
        }
    }
    fw.verify()?;

    let wear = fw.wear();
    info!("Translation layer:\n{}", fw.stats());
    info!(
        "Erase counts: min {}, max {}, mean {:.2}, spread {}",
        wear.min, wear.max, wear.mean, wear.spread
    );

    let flash = fw.close();
    let raw = flash.stats();
    info!(
        "Flash: {} reads, {} writes, {} erases",
        raw.reads, raw.writes, raw.erases
    );
    Ok(())
}

// Page contents that identify both the block and the write that produced it.
fn stamp(lba: Addr, generation: u8) -> Vec<u8> {
    let mut data = vec![generation; PAGE_SIZE];
    data[..8].copy_from_slice(&(lba as u64).to_le_bytes());
    data
}
