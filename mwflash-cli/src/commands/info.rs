//! Plan info and port listing command implementations.

use {
    super::PlanSettings,
    crate::{PlanArgs, config::Config},
    anyhow::{Context, Result},
    console::style,
    mwflash::{
        ByteCommand, FirmwareImage, NativePortEnumerator, PortEnumerator, UploadPlan, format_hms,
    },
};

/// An image together with the plan that would upload it.
pub(crate) struct PlannedUpload {
    pub image: FirmwareImage,
    pub plan: UploadPlan,
}

impl PlannedUpload {
    /// Load the image named by `settings` and build its plan.
    pub(crate) fn load(settings: &PlanSettings) -> Result<Self> {
        let image = FirmwareImage::load(&settings.firmware).with_context(|| {
            format!("Failed to load firmware {}", settings.firmware.display())
        })?;
        let plan = UploadPlan::new(
            settings.load_address,
            image.len(),
            settings.order,
            settings.delay,
        )?;
        Ok(Self { image, plan })
    }

    /// First command of the traversal, if the image is not empty.
    pub(crate) fn first_command(&self) -> Option<ByteCommand> {
        self.plan
            .order()
            .indices(self.image.len())
            .next()
            .and_then(|i| {
                self.image
                    .get(i)
                    .map(|value| ByteCommand::new(self.plan.address_of(i), value))
            })
    }

    /// Print the pre-run summary to stderr.
    pub(crate) fn print_summary(&self) {
        let plan = &self.plan;
        if let Some(path) = self.image.path() {
            eprintln!("  File:           {}", path.display());
        }
        eprintln!("  Firmware size:  {} bytes", plan.length());
        eprintln!("  Load address:   0x{:08x}", plan.base_address());
        eprintln!("  End address:    0x{:08x}", plan.end_address());
        eprintln!("  Order:          {}", plan.order());
        eprintln!(
            "  Command delay:  {} ms",
            plan.inter_command_delay().as_millis()
        );
        eprintln!(
            "  Estimated time: {} (pacing only)",
            format_hms(plan.estimated_duration())
        );
        if let Some(cmd) = self.first_command() {
            eprintln!("  First command:  {}", style(cmd).dim());
        }
    }
}

/// Info command implementation.
pub(crate) fn cmd_info(config: &Config, args: &PlanArgs, json: bool) -> Result<()> {
    let settings = PlanSettings::resolve(args, config)?;
    let planned = PlannedUpload::load(&settings)?;

    if json {
        let plan = &planned.plan;
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "file": settings.firmware.display().to_string(),
                "size": plan.length(),
                "load_address": format!("0x{:08x}", plan.base_address()),
                "end_address": format!("0x{:08x}", plan.end_address()),
                "order": plan.order().as_str(),
                "delay_ms": u64::try_from(plan.inter_command_delay().as_millis()).unwrap_or(u64::MAX),
                "estimated_seconds": plan.estimated_duration().as_secs(),
                "first_command": planned.first_command().map(|c| c.to_string()),
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!("{}", style("Upload plan").bold().underlined());
    planned.print_summary();
    Ok(())
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = NativePortEnumerator::list_ports()?;

    if json {
        let ports: Vec<serde_json::Value> = ports
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                })
            })
            .collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": ports,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports").bold().underlined());

    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
    } else {
        for port in &ports {
            let product = port.product.as_deref().unwrap_or("");
            let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" ({vid:04X}:{pid:04X})")
            } else {
                String::new()
            };
            eprintln!(
                "  {} {}{} {}",
                style("•").dim(),
                style(&port.name).cyan(),
                vid_pid,
                style(product).dim()
            );
        }
    }

    Ok(())
}
