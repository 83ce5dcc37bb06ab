use neso::cartridge::Cartridge;
use neso::nes::Nes;
use std::error::Error;
use std::{env, fs, process};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "neso".into());
    let Some(path) = args.next() else {
        eprintln!("usage: {program} <rom-image>");
        process::exit(2);
    };

    let image = fs::read(&path)?;
    let cartridge = Cartridge::new(&image)?;
    log::info!("loaded {path}");

    let mut nes = Nes::new(cartridge);
    nes.run();

    if let Some(halt) = nes.halt_state() {
        println!(
            "halted on undefined opcode {:#04x} after {} master ticks",
            halt.opcode,
            nes.master_ticks()
        );
        println!("{}", halt.registers);
    }
    Ok(())
}
