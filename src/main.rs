#[cfg(not(feature = "streaming"))]
fn main() {
    eprintln!(
        "The sfx-mixer CLI requires the \"streaming\" feature. Rebuild with `--features streaming` to enable playback."
    );
}

#[cfg(feature = "streaming")]
mod cli {
    use std::env;
    use std::fs;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use anyhow::{bail, Context};
    use parking_lot::Mutex;
    use sfx_mixer::{
        ChannelState, LoopMode, Mixer, MixerConfig, SampleBuffer, SampleProducer, SharedProducer,
        CHANNEL_COUNT, MAX_VOLUME,
    };

    const DEFAULT_FREQ: u32 = 8000;
    const DEFAULT_SECONDS: f32 = 10.0;
    const POLL_INTERVAL: Duration = Duration::from_millis(20);

    /// Square wave music stand-in, one octave apart on each side
    struct SquareProducer {
        rate: u32,
        phase: u32,
        period: u32,
    }

    impl SquareProducer {
        fn new() -> Self {
            SquareProducer {
                rate: 22050,
                phase: 0,
                period: 100,
            }
        }
    }

    impl SampleProducer for SquareProducer {
        fn start(&mut self, _target_rate: u32) {
            self.phase = 0;
        }

        fn stop(&mut self) {}

        fn frequency(&self) -> u32 {
            self.rate
        }

        fn produce_samples(&mut self, buf: &mut [i8], frames: usize) {
            for frame in buf.chunks_exact_mut(2).take(frames) {
                let left = if self.phase < self.period / 2 { 24 } else { -24 };
                let right = if self.phase % (self.period / 2) < self.period / 4 { 16 } else { -16 };
                frame[0] = left;
                frame[1] = right;
                self.phase = (self.phase + 1) % self.period;
            }
        }
    }

    struct Args {
        file: String,
        freq: u32,
        channel: u8,
        wav: bool,
        music: bool,
        seconds: Duration,
        config: Option<String>,
    }

    fn usage() {
        eprintln!(
            "Usage:\n  sfx-mixer [--freq <hz>] [--channel <0-3>] [--wav] [--music] [--seconds <s>] [--config <file.json>] <asset>\n\nFlags:\n  --freq <hz>          Source rate of a raw asset (default {DEFAULT_FREQ})\n  --channel <n>        Channel to play on (default 0)\n  --wav                Asset is already a mono 8-bit WAV container\n  --music              Also run a test tone on the music stream\n  --seconds <s>        Stop after this long (default {DEFAULT_SECONDS})\n  --config <file>      Mixer configuration as JSON\n  -h, --help           Show this help\n"
        );
    }

    /// Non-negative, finite number of seconds
    fn parse_seconds(value: &str) -> anyhow::Result<Duration> {
        let secs: f32 = value
            .parse()
            .with_context(|| format!("invalid duration '{value}'"))?;
        Duration::try_from_secs_f32(secs).with_context(|| format!("invalid duration '{value}'"))
    }

    fn parse_args() -> anyhow::Result<Option<Args>> {
        let mut file = None;
        let mut freq = DEFAULT_FREQ;
        let mut channel = 0u8;
        let mut wav = false;
        let mut music = false;
        let mut seconds = Duration::from_secs_f32(DEFAULT_SECONDS);
        let mut config = None;

        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--help" | "-h" => return Ok(None),
                "--wav" => wav = true,
                "--music" => music = true,
                "--freq" => {
                    let value = args.next().context("--freq requires an argument")?;
                    freq = value.parse().with_context(|| format!("invalid frequency '{value}'"))?;
                }
                "--channel" => {
                    let value = args.next().context("--channel requires an argument")?;
                    channel = value.parse().with_context(|| format!("invalid channel '{value}'"))?;
                    if channel as usize >= CHANNEL_COUNT {
                        bail!("channel must be below {CHANNEL_COUNT}");
                    }
                }
                "--seconds" => {
                    let value = args.next().context("--seconds requires an argument")?;
                    seconds = parse_seconds(&value)?;
                }
                "--config" => {
                    config = Some(args.next().context("--config requires an argument")?);
                }
                _ if arg.starts_with('-') => bail!("unknown flag: {arg}"),
                _ => file = Some(arg),
            }
        }

        Ok(file.map(|file| Args {
            file,
            freq,
            channel,
            wav,
            music,
            seconds,
            config,
        }))
    }

    pub fn run() -> anyhow::Result<()> {
        let Some(args) = parse_args()? else {
            usage();
            return Ok(());
        };

        let config = match &args.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config '{path}'"))?;
                MixerConfig::from_json(&json)?
            }
            None => MixerConfig::default(),
        };

        let data = fs::read(&args.file)
            .with_context(|| format!("failed to read asset '{}'", args.file))?;

        let mut mixer = Mixer::new(config);
        mixer.init().context("failed to open audio output")?;
        if let Some(spec) = mixer.output_spec() {
            println!(
                "Output: {} Hz, {} channels, {} frames per buffer",
                spec.sample_rate, spec.channels, spec.buffer_frames
            );
        }

        if args.wav {
            mixer.play_sound_wav(args.channel, SampleBuffer::from_vec(data), MAX_VOLUME, LoopMode::Once)?;
        } else {
            mixer.play_sound_raw(args.channel, &data, args.freq, MAX_VOLUME)?;
        }
        println!("Playing '{}' on channel {}", args.file, args.channel);

        let producer: Option<SharedProducer> = args
            .music
            .then(|| Arc::new(Mutex::new(SquareProducer::new())) as SharedProducer);
        if let Some(producer) = &producer {
            mixer.play_music_stream(producer)?;
            println!("Music stream running");
        }

        let deadline = Instant::now()
            .checked_add(args.seconds)
            .context("playback duration too long")?;
        while Instant::now() < deadline {
            thread::sleep(POLL_INTERVAL);
            mixer.reclaim_finished();
            if producer.is_none() && mixer.channel_state(args.channel)? == ChannelState::Empty {
                break;
            }
        }

        mixer.stop_all();
        mixer.quit();
        println!("Playback complete!");
        Ok(())
    }

}

#[cfg(feature = "streaming")]
fn main() -> anyhow::Result<()> {
    cli::run()
}
