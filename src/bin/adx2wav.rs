use std::env;
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::process;

use getopts::Options;
use hound::{SampleFormat, WavSpec, WavWriter};
use log::{error, info};

use adxconv::adx_header::AdxHeader;
use adxconv::decoder::Decoder;

fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let mut args = env::args();
    let prog_name = args.next().unwrap_or_else(|| "adx2wav".to_string());
    let options: Vec<_> = args.collect();

    // Create options
    let mut opts = Options::new();
    opts.optopt("o", "output", "Output wav file (defaults to INPUT.wav)", "OUTPUT");
    opts.optflag("i", "info", "Print adx header info and exit");
    opts.optflag("h", "help", "Print this help menu");

    let matches = unwrap_or_barf(opts.parse(&options), "Could not parse options");
    if matches.opt_present("h") {
        help(&prog_name, opts);
    }

    let filename = match matches.free.first() {
        Some(f) => f.clone(),
        None => help(&prog_name, opts),
    };
    let output_filename = matches
        .opt_str("o")
        .unwrap_or_else(|| format!("{}.wav", filename));

    let adx_file = BufReader::new(unwrap_or_barf(File::open(&filename), "Could not open adx file"));
    if matches.opt_present("i") {
        let header = unwrap_or_barf(AdxHeader::read_header(adx_file), "Could not read adx header");
        println!("{:#?}", header);
        return;
    }

    let mut adx = unwrap_or_barf(adxconv::from_reader(adx_file), "Could not make adx reader");

    info!("ADX info:");
    info!("    channels: {}", adx.channels());
    info!("    sample rate: {}", adx.sample_rate());
    info!("    total samples: {}", adx.header().total_samples);
    match adx.loop_info() {
        Some(loop_info) => {
            info!("    loop start sample: {}", loop_info.start_sample);
            info!("    loop end sample: {}", loop_info.end_sample);
        }
        None => info!("    non-looping ADX"),
    }

    let spec = WavSpec {
        channels: adx.channels() as u16,
        sample_rate: adx.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let wav_file = BufWriter::new(unwrap_or_barf(File::create(&output_filename), "Could not open output file"));
    let mut wav_writer = unwrap_or_barf(WavWriter::new(wav_file, spec), "Could not make wav writer");

    info!("Decoding {} to {}.", filename, output_filename);
    unwrap_or_barf(adx.decode_into(&mut wav_writer), "Could not decode adx");
    unwrap_or_barf(wav_writer.finalize(), "Could not finalize writing wav file");
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
    println!("adx2wav {}", env!("CARGO_PKG_VERSION"));
    print!("{}", opts.usage(&brief));
    process::exit(0);
}
