//! `tether classes` — list the host classes and their members

use crate::output::StyledOutput;
use tether_runtime::BridgeConfig;
use termcolor::ColorChoice;

pub fn execute(choice: ColorChoice) -> anyhow::Result<()> {
    let host = super::sample_host(&BridgeConfig::default());
    let mut out = StyledOutput::new(choice);

    for class in host.classes() {
        out.bold(class.name());
        out.plain(&format!("  {}", class.descriptor()));
        out.newline();

        for constructor in class.constructors() {
            out.plain(&format!("    <init>{}", constructor.signature()));
            out.newline();
        }
        for method in class.methods() {
            let modifiers = match (method.public, method.is_static()) {
                (true, true) => "static ",
                (true, false) => "",
                (false, true) => "private static ",
                (false, false) => "private ",
            };
            out.plain(&format!("    {}{}{}", modifiers, method.name, method.signature()));
            out.newline();
        }
    }
    out.flush();
    Ok(())
}
