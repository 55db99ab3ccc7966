#![no_main]
use libfuzzer_sys::arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use moma_core::VelocityProfile;

#[derive(Debug, Arbitrary)]
struct Input {
    v_init: f64,
    v_final: f64,
    alpha_init: f64,
    alpha_final: f64,
    t0: f64,
    t_conv: f64,
    t: f64,
}

fuzz_target!(|input: Input| {
    let cfg = moma_config::ProfileCfg {
        v_init: input.v_init,
        v_final: input.v_final,
        alpha_init: input.alpha_init,
        alpha_final: input.alpha_final,
        t0: input.t0,
        t_conv: input.t_conv,
        ..Default::default()
    };
    let profile = VelocityProfile::from(&cfg);
    let bounded = [cfg.v_init, cfg.v_final, cfg.alpha_init, cfg.alpha_final, cfg.t0, cfg.t_conv, input.t]
        .iter()
        .all(|x| x.is_finite() && x.abs() < 1e6);
    // A degenerate tail must surface as an error, never as a non-finite speed.
    if let Ok(v) = profile.speed(input.t) {
        if bounded {
            assert!(v.is_finite(), "speed({}) = {v}", input.t);
        }
    }
    let _ = profile.continuity_gap();
});
