use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

use strictxml::{
    sax::{
        handler::DebugHandler,
        parser::{ParserOption, XMLReaderBuilder},
    },
    tree::{Document, ParseOptions, WriterOptions},
    xpath,
};

#[derive(clap::Parser)]
#[command(about = "Parse, validate, query and reserialize XML documents")]
struct CmdArgs {
    #[clap(long, help = "inspect with the SAX API")]
    sax: bool,
    #[clap(long, help = "validate using the DTD")]
    dtd_valid: bool,
    #[clap(long, help = "disable namespace handling")]
    no_namespace: bool,
    #[clap(long, help = "keep CDATA sections as distinct nodes")]
    preserve_cdata: bool,
    #[clap(long, help = "evaluate an XPath expression against each document")]
    xpath: Option<String>,
    #[clap(long, help = "reserialize each document to stdout")]
    write: bool,
    #[clap(long, help = "indent width used with --wrap", default_value_t = 2)]
    indent: usize,
    #[clap(long, help = "each child element on its own line")]
    wrap: bool,
    #[clap(long, help = "collapse whitespace in text content")]
    trim: bool,
    #[clap(long, help = "suppress comments on output")]
    no_comment: bool,
    #[clap(help = "path to the target XML documents")]
    file: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = CmdArgs::parse();

    let expression = args
        .xpath
        .as_deref()
        .map(xpath::compile)
        .transpose()
        .context("the XPath expression cannot be compiled")?;

    let mut status = Ok(());
    for file in &args.file {
        if args.sax {
            let mut builder = XMLReaderBuilder::new().set_handler(DebugHandler::default());
            if args.dtd_valid {
                builder = builder.enable_option(ParserOption::Validation);
            }
            if args.no_namespace {
                builder = builder.disable_option(ParserOption::Namespaces);
            }
            let mut reader = builder.build();
            reader.parse_file(file).ok();
            print!("{}", reader.handler.buffer);
            if reader.handler.fatal_error {
                status = Err(anyhow::anyhow!("{} is not well-formed", file.display()));
            }
            continue;
        }

        let options = ParseOptions {
            validating: args.dtd_valid,
            preserve_cdata: args.preserve_cdata,
            namespaces: !args.no_namespace,
            ..ParseOptions::default()
        };
        let document = match Document::parse_file(file, options) {
            Ok(document) => document,
            Err(err) => {
                eprintln!("{err}");
                status = Err(anyhow::anyhow!("{} cannot be parsed", file.display()));
                continue;
            }
        };

        if let Some(expression) = expression.as_ref() {
            let nodes = expression
                .evaluate_nodes(&document, document.root(), None)
                .context("the XPath expression cannot be evaluated")?;
            println!("{}: {} node(s)", file.display(), nodes.len());
            for node in &nodes {
                println!("  {}", document.string_value(node));
            }
        }

        if args.write {
            let options = WriterOptions {
                indent: args.indent,
                wrap: args.wrap,
                trim: args.trim,
                no_comment: args.no_comment,
                wrap_prolog: args.wrap,
                ..WriterOptions::default()
            };
            print!("{}", document.write(&options));
            if !args.wrap {
                println!();
            }
        }
    }
    status
}
