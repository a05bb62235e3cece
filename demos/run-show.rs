//! Demo server: a couple of animated tunnels streamed on one channel.
//!
//! Run with `cargo run --example run-show`, then point a display client (or `nc`) at
//! tcp://localhost:6000. Connect an APC-style controller or a TouchOSC tablet on port 9000 to
//! play with it live.

use std::time::Duration;

use arclight::{
    AnimationTarget, Show, ShowOptions, Tunnel, WaveformKind,
};

fn main() -> Result<(), arclight::Error> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let options = ShowOptions::default()
        .bind_address("0.0.0.0:6000")
        .osc_listen("tablet", "0.0.0.0:9000")
        .midi_input("apc", "APC40");
    let mut show = Show::new(options)?;

    // a slowly rotating rainbow ring
    let mut outer = Tunnel::default();
    outer.rotation_speed = 0.05;
    outer.segments = 32;
    outer.size = 0.8;
    outer.col_spread = 1.0;
    let slot = outer.animators.slot_mut(0);
    slot.target = Some(AnimationTarget::Size);
    slot.animator.waveform = WaveformKind::Sine;
    slot.animator.speed = 0.25;
    slot.animator.weight = 0.1;

    // a marquee-chasing inner ring
    let mut inner = Tunnel::default();
    inner.marquee_speed = 0.2;
    inner.segments = 12;
    inner.blacking = 1;
    inner.size = 0.4;
    inner.col_center = 0.6;

    {
        let mixer = show.state_mut().mixer_mut();
        mixer.set_beam(0, outer.into())?;
        mixer.set_beam(1, inner.into())?;
        mixer.layer_mut(0).expect("layer 0 exists").level = 1.0;
        mixer.layer_mut(1).expect("layer 1 exists").level = 0.8;
    }

    let _handle = show.run();
    log::info!("Streaming tunnels; press ctrl-c to quit");
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}
