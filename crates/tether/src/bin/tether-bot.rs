// Headless Tether participant for exercising a relay by hand.
//
// Connects, announces an avatar, and walks in a circle, streaming its pose
// and a bone string every tick. Optionally carries one rigidbody along.
// Remote registry events are logged as JSON.
//
// Usage:
//   tether-bot [OPTIONS]
//     --server <HOST>      Relay host (default: 127.0.0.1)
//     --port <PORT>        Relay port (default: 7777)
//     --avatar <NAME>      Avatar to announce (default: the relay's)
//     --objects <N>        Networked rigidbodies in the world (default: 4)
//     --carry <ID>         Grab this object and carry it around
//     --config <FILE>      JSON client config; flags override its values

use std::f32::consts::TAU;
use std::time::Duration;

use anyhow::{Context, bail};
use rand::Rng;
use tether::prelude::*;
use tracing_subscriber::EnvFilter;

struct Options {
    client: ClientConfig,
    avatar: Option<String>,
    objects: usize,
    carry: Option<ObjectId>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = parse_args()?;
    let server = options.client.resolve()?;

    let transport = UdpTransport::bind("0.0.0.0:0")
        .await
        .context("failed to bind client socket")?;
    let mut client = SyncClient::new(
        transport,
        options.client.session_config(),
        options.objects,
    );
    client.set_avatar(options.avatar);
    if let Some(object_id) = options.carry {
        client.grab(object_id)?;
    }
    client.connect(server)?;

    // Start somewhere random on the circle so several bots don't overlap.
    let phase = rand::rng().random_range(0.0..TAU);
    let mut bot = Bot {
        client,
        carry: options.carry,
        angle: phase,
    };

    let mut scheduler = TickScheduler::with_rate(options.client.tick_rate_hz);
    scheduler
        .run(&mut bot, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    if let Some(object_id) = bot.carry {
        bot.client.release(object_id)?;
    }
    bot.client.disconnect();
    tracing::info!("bot disconnected");
    Ok(())
}

struct Bot {
    client: SyncClient<UdpTransport>,
    carry: Option<ObjectId>,
    angle: f32,
}

impl Bot {
    const RADIUS: f32 = 3.0;
    /// Radians per second.
    const SPEED: f32 = 0.5;

    fn pose(&self) -> Pose {
        let position = Vec3::new(
            Self::RADIUS * self.angle.cos(),
            0.0,
            Self::RADIUS * self.angle.sin(),
        );
        // Face along the direction of travel.
        Pose::new(position, Quat::from_rotation_y(-self.angle))
    }

    fn bones(&self) -> BonePose {
        let swing = 30.0 * (self.angle * 4.0).sin();
        BonePose::new(vec![
            Vec3::new(swing, 0.0, 0.0),
            Vec3::new(-swing, 0.0, 0.0),
        ])
    }
}

impl Tickable for Bot {
    fn tick(&mut self, dt: Duration) {
        self.angle = (self.angle + Self::SPEED * dt.as_secs_f32()) % TAU;
        let pose = self.pose();
        self.client.set_local_pose(pose);
        self.client.set_local_bones(&self.bones());
        if let Some(object_id) = self.carry {
            let held = Pose::new(
                Vec3::new(pose.position.x, 1.0, pose.position.z),
                pose.orientation,
            );
            if let Err(e) = self.client.set_object_pose(object_id, held) {
                tracing::warn!(error = %e, "cannot move carried object");
            }
        }

        self.client.tick(dt);

        for event in self.client.drain_client_events() {
            tracing::info!(?event, "connection");
        }
        for event in self.client.drain_events() {
            // Pose updates arrive every tick; only log them at trace.
            let noisy = matches!(
                event,
                RegistryEvent::AvatarPoseUpdated { .. }
                    | RegistryEvent::AvatarBonesUpdated { .. }
                    | RegistryEvent::RigidbodyPoseUpdated { .. }
            );
            match serde_json::to_string(&event) {
                Ok(json) if noisy => tracing::trace!(%json, "registry"),
                Ok(json) => tracing::info!(%json, "registry"),
                Err(e) => tracing::debug!(error = %e, "cannot serialize event"),
            }
        }
    }
}

fn parse_args() -> anyhow::Result<Options> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let client = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).context("--config requires a file path")?;
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read config file {path}"))?;
            ClientConfig::from_json_str(&json)?
        }
        None => ClientConfig::default(),
    };
    let mut options = Options {
        client,
        avatar: None,
        objects: 4,
        carry: None,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--server" => {
                options.client.server_addr = iter.next().context("--server requires a host")?.clone();
            }
            "--port" => options.client.port = value(&mut iter, "--port")?,
            "--avatar" => {
                options.avatar = Some(iter.next().context("--avatar requires a name")?.clone());
            }
            "--objects" => options.objects = value(&mut iter, "--objects")?,
            "--carry" => options.carry = Some(ObjectId(value(&mut iter, "--carry")?)),
            "--config" => {
                iter.next();
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                print_usage();
                bail!("unknown argument: {other}");
            }
        }
    }
    Ok(options)
}

fn value<'a, T>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = iter.next().with_context(|| format!("{flag} requires a value"))?;
    raw.parse()
        .with_context(|| format!("{flag}: invalid value {raw:?}"))
}

fn print_usage() {
    println!("Usage: tether-bot [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --server <HOST>    Relay host (default: 127.0.0.1)");
    println!("  --port <PORT>      Relay port (default: 7777)");
    println!("  --avatar <NAME>    Avatar to announce (default: the relay's)");
    println!("  --objects <N>      Networked rigidbodies in the world (default: 4)");
    println!("  --carry <ID>       Grab this object and carry it around");
    println!("  --config <FILE>    JSON client config; flags override its values");
    println!("  --help, -h         Show this help");
}
