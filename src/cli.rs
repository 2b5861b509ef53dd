use crate::config::load_config;
use crate::geometry::Point;
use crate::layout::SvgLayout;
use crate::render::{standalone_svg, write_output_png, write_output_svg};
use crate::script::{Script, run_script, simulation};
use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "dragsvg", version, about = "Draggable SVG proxies: isolate and simulate")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the isolated proxy of each draggable element
    Isolate(IsolateArgs),
    /// Replay a JSON pointer script and print the resulting drag state
    Simulate(SimulateArgs),
}

#[derive(ClapArgs, Debug)]
pub struct PageArgs {
    /// Input markup file (.svg/.html fragment) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Config JSON file (markerAttribute, resizeThrottleMs, proxyCursor)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Page position of the first <svg>, as X,Y
    #[arg(long = "origin", value_parser = parse_point, default_value = "0,0")]
    pub origin: Point,
}

#[derive(ClapArgs, Debug)]
pub struct IsolateArgs {
    #[command(flatten)]
    pub page: PageArgs,

    /// Isolate only the element with this id, marked or not
    #[arg(long = "element")]
    pub element: Option<String>,

    /// Output file (svg/png). Defaults to stdout for SVG if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "svg")]
    pub output_format: OutputFormat,
}

#[derive(ClapArgs, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub page: PageArgs,

    /// Script JSON file: {"steps": [{"op": "down", "element": "id"}, ...]}
    #[arg(short = 's', long = "script")]
    pub script: PathBuf,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Svg,
    Png,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Isolate(args) => isolate(args),
        Command::Simulate(args) => simulate(args),
    }
}

fn isolate(args: IsolateArgs) -> Result<()> {
    let config = load_config(args.page.config.as_deref())?;
    let input = read_input(args.page.input.as_deref())?;
    let mut manager = simulation(&input, SvgLayout::new(args.page.origin), config)?;

    match args.element.as_deref() {
        Some(id) => {
            let element = manager
                .document()
                .element_by_id(id)
                .ok_or_else(|| anyhow::anyhow!("No element with id `{}`", id))?;
            manager.register(element)?;
        }
        None => {
            manager.initialize()?;
        }
    }

    let proxies: Vec<String> = manager
        .controllers()
        .iter()
        .map(|controller| standalone_svg(&manager.document().to_markup(*controller.proxy())))
        .collect();
    if proxies.is_empty() {
        return Err(anyhow::anyhow!("No draggable elements found in input"));
    }
    tracing::info!(count = proxies.len(), "isolated draggables");

    if proxies.len() == 1 {
        match args.output_format {
            OutputFormat::Svg => write_output_svg(&proxies[0], args.output.as_deref())?,
            OutputFormat::Png => {
                let output = ensure_output(&args.output, "png")?;
                write_output_png(&proxies[0], &output)?;
            }
        }
        return Ok(());
    }

    if args.output.is_none() && matches!(args.output_format, OutputFormat::Svg) {
        for proxy in &proxies {
            write_output_svg(proxy, None)?;
        }
        return Ok(());
    }

    let outputs = resolve_multi_outputs(args.output.as_deref(), args.output_format, proxies.len())?;
    for (proxy, output) in proxies.iter().zip(&outputs) {
        match args.output_format {
            OutputFormat::Svg => write_output_svg(proxy, Some(output))?,
            OutputFormat::Png => write_output_png(proxy, output)?,
        }
    }
    Ok(())
}

fn simulate(args: SimulateArgs) -> Result<()> {
    let config = load_config(args.page.config.as_deref())?;
    let input = read_input(args.page.input.as_deref())?;
    let script: Script = serde_json::from_str(&std::fs::read_to_string(&args.script)?)?;
    let report = run_script(&input, SvgLayout::new(args.page.origin), config, &script)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return Ok(std::fs::read_to_string(path)?);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn parse_point(value: &str) -> std::result::Result<Point, String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got `{value}`"))?;
    let x = x.trim().parse::<f64>().map_err(|err| err.to_string())?;
    let y = y.trim().parse::<f64>().map_err(|err| err.to_string())?;
    Ok(Point::new(x, y))
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!("Output path required for {} output", ext))
}

fn resolve_multi_outputs(
    output: Option<&Path>,
    format: OutputFormat,
    count: usize,
) -> Result<Vec<PathBuf>> {
    let ext = match format {
        OutputFormat::Svg => "svg",
        OutputFormat::Png => "png",
    };
    let base = output.ok_or_else(|| anyhow::anyhow!("Output path required for multiple proxies"))?;
    if base.is_dir() {
        return Ok((0..count)
            .map(|idx| base.join(format!("proxy-{}.{}", idx + 1, ext)))
            .collect());
    }
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("proxy");
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    Ok((0..count)
        .map(|idx| parent.join(format!("{}-{}.{}", stem, idx + 1, ext)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_origin_points() {
        assert_eq!(parse_point("10, 20.5").unwrap(), Point::new(10.0, 20.5));
        assert!(parse_point("10").is_err());
        assert!(parse_point("a,b").is_err());
    }

    #[test]
    fn numbers_multiple_outputs_after_the_stem() {
        let outputs =
            resolve_multi_outputs(Some(Path::new("out/avatar.svg")), OutputFormat::Svg, 2).unwrap();
        assert_eq!(
            outputs,
            vec![PathBuf::from("out/avatar-1.svg"), PathBuf::from("out/avatar-2.svg")]
        );
        assert!(resolve_multi_outputs(None, OutputFormat::Png, 2).is_err());
    }

    #[test]
    fn parses_subcommands() {
        let args = Args::try_parse_from([
            "dragsvg", "isolate", "-i", "page.svg", "--element", "logo", "--origin", "100,100",
        ])
        .unwrap();
        let Command::Isolate(isolate) = args.command else {
            panic!("expected isolate");
        };
        assert_eq!(isolate.element.as_deref(), Some("logo"));
        assert_eq!(isolate.page.origin, Point::new(100.0, 100.0));
    }
}
