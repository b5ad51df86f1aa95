use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use chrono::{Local, TimeZone};
use tracing::{debug, info, trace};

use crate::config::SenderConfig;
use crate::sample::{LoadSampler, PROC_STAT};
use crate::wire::Measurement;

/// Tick period for a sample frequency in Hz.
pub fn interval_from_freq(freq: f64) -> anyhow::Result<Duration> {
    if !freq.is_finite() || freq <= 0.0 {
        bail!("sample frequency must be a positive number of Hz, got {freq}");
    }
    Ok(Duration::from_secs_f64(1.0 / freq))
}

/// Runs the sample/encode/send loop until a fatal error. Every tick sleeps
/// the configured interval, samples /proc/stat, stamps the result with the
/// current wall-clock time and fires one datagram at the receiver. UDP is
/// fire-and-forget: there is no buffering and no retry, a failed send or an
/// unreadable counter source terminates the loop.
pub fn run(config: &SenderConfig) -> anyhow::Result<()> {
    let interval = interval_from_freq(config.freq)?;
    let dest = SocketAddr::from((config.host, config.port));

    let bind_addr: SocketAddr = if dest.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(bind_addr).context("failed to create sender socket")?;

    let mut sampler = LoadSampler::open(PROC_STAT)?;
    info!(
        "querying load of {} cpu slots at {} Hz, sending to {dest}",
        sampler.ncpu(),
        config.freq
    );

    loop {
        // std::thread::sleep resumes across signal interruption, so an
        // interrupted wait continues instead of failing the tick.
        thread::sleep(interval);

        let loads = sampler.sample()?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock is before the unix epoch")?;
        let measurement = Measurement::new(now.as_secs(), u64::from(now.subsec_nanos()), loads);
        trace_tick(&measurement);

        let buf = measurement.encode();
        socket
            .send_to(&buf, dest)
            .with_context(|| format!("failed to send datagram to {dest}"))?;
    }
}

fn trace_tick(measurement: &Measurement) {
    let when = Local
        .timestamp_opt(measurement.seconds as i64, measurement.nanoseconds as u32)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| format!("{}.{:09}", measurement.seconds, measurement.nanoseconds));
    let total = measurement.loads.first().copied().unwrap_or(0.0);
    debug!("{when} cpu total load: {:.2}%", total * 100.0);
    for (cpu, load) in measurement.loads.iter().skip(1).enumerate() {
        trace!("cpu{cpu} load: {:.2}%", load * 100.0);
    }
}
