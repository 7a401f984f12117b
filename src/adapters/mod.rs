use crate::core::hardware::MountResolver;

#[cfg(target_os = "linux")]
mod linux;
mod simulated;

#[cfg(target_os = "linux")]
pub use linux::LinuxMountResolver;
pub use simulated::{SimulatedResolver, Simulator};

pub fn get_resolver(simulation: bool) -> Box<dyn MountResolver> {
    if simulation {
        let (resolver, controller) = SimulatedResolver::new();

        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lines() {
                let Ok(cmd) = line else { break };
                let parts: Vec<&str> = cmd.split_whitespace().collect();
                match parts.first().copied() {
                    Some("attach") => match parts.get(1) {
                        Some(path) => controller.attach(*path),
                        None => eprintln!("(Simulator) Use: 'attach <path>'"),
                    },
                    Some("detach") => controller.detach(),
                    _ => eprintln!("(Simulator) Use: 'attach <path>' or 'detach'"),
                }
            }
        });

        return Box::new(resolver);
    }

    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxMountResolver::with_defaults())
    }

    #[cfg(not(target_os = "linux"))]
    {
        Box::new(SimulatedResolver::new().0)
    }
}
