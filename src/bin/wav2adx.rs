use std::env;
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::process;

use getopts::Options;
use hound::{SampleFormat, WavReader};
use log::{error, info};

use adxconv::encoder::StandardEncoder;
use adxconv::{AdxSpec, LoopInfo, DEFAULT_HIGHPASS_FREQ};

fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let mut args = env::args();
    let prog_name = args.next().unwrap_or_else(|| "wav2adx".to_string());
    let options: Vec<_> = args.collect();

    // Create options
    let mut opts = Options::new();
    opts.optopt("o", "output", "Output adx file (defaults to INPUT.adx)", "OUTPUT");
    opts.optopt("f", "highpass", "Highpass frequency (defaults to 500)", "HZ");
    opts.optopt("s", "start", "Loop start sample (defaults to 0)", "START");
    opts.optopt("e", "end", "Loop end sample (no loop unless START < END)", "END");
    opts.optflag("n", "no-loop", "Don't loop the song");
    opts.optflag("h", "help", "Print this help menu");

    let matches = unwrap_or_barf(opts.parse(&options), "Could not parse options");
    if matches.opt_present("h") {
        help(&prog_name, opts);
    }

    let highpass_frequency = parse_opt(&matches, "f", "highpass frequency").unwrap_or(DEFAULT_HIGHPASS_FREQ);
    let start_sample = parse_opt(&matches, "s", "loop start").unwrap_or(0);
    let end_sample = parse_opt(&matches, "e", "loop end").unwrap_or(0);

    let filename = match matches.free.first() {
        Some(f) => f.clone(),
        None => help(&prog_name, opts),
    };
    let output_filename = matches
        .opt_str("o")
        .unwrap_or_else(|| format!("{}.adx", filename));

    let input = BufReader::new(unwrap_or_barf(File::open(&filename), "Could not open input file"));
    let mut reader = unwrap_or_barf(WavReader::new(input), "Could not read wav header");
    let wav_spec = reader.spec();
    if wav_spec.channels == 0 || wav_spec.channels > 2 {
        barf(&format!("{} channels are not supported (expected 1 or 2)", wav_spec.channels));
    }
    if wav_spec.sample_format != SampleFormat::Int || wav_spec.bits_per_sample != 16 {
        barf("Only 16-bit integer wav input is supported");
    }

    let loop_info = if matches.opt_present("n") {
        None
    }
    else {
        LoopInfo::new(start_sample, end_sample)
    };
    let spec = AdxSpec {
        channels: wav_spec.channels as u32,
        sample_rate: wav_spec.sample_rate,
        highpass_frequency: highpass_frequency,
        loop_info: loop_info,
    };
    info!("Encoding {} to {} ({:?}).", filename, output_filename, spec);

    info!("Reading samples.");
    let samples: Result<Vec<i16>, _> = reader.samples::<i16>().collect();
    let samples = unwrap_or_barf(samples, "Could not read samples from input");

    let output = BufWriter::new(unwrap_or_barf(File::create(&output_filename), "Could not open output file"));
    let mut encoder = unwrap_or_barf(StandardEncoder::new(output, spec), "Could not make encoder");

    info!("Encoding data.");
    unwrap_or_barf(encoder.encode_data(samples), "Could not encode data");
    unwrap_or_barf(encoder.finish(), "Could not finish writing adx file");
}

fn parse_opt<T>(matches: &getopts::Matches, name: &str, desc: &str) -> Option<T>
    where T: std::str::FromStr
{
    matches.opt_str(name).map(|value| match value.parse::<T>() {
        Ok(parsed) => parsed,
        Err(_) => barf(&format!("Invalid {}: {}", desc, value)),
    })
}

fn barf(message: &str) -> ! {
    error!("{}", message);
    process::exit(1);
}

fn unwrap_or_barf<T, E>(result: Result<T, E>, err_desc: &str) -> T
    where E: Error
{
    result.unwrap_or_else(|err| {
        let err_string = format!("{}: {}", err_desc, err);
        barf(&err_string);
    })
}

fn help(prog_name: &str, opts: Options) -> ! {
    let brief = format!("Usage: {} [options] INPUT", prog_name);
    println!("wav2adx {}", env!("CARGO_PKG_VERSION"));
    print!("{}", opts.usage(&brief));
    process::exit(0);
}
