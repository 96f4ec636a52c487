//! Programmer registration and dispatch
//!
//! A programmer string names a backend and its options, e.g.
//! `linux_spi:dev=/dev/spidev0.0,spispeed=4000,mode=3` or `dummy:mode=1`.
//! [`open_spi`] turns such a string into an open [`SpiDevice`] over
//! [`AnySpi`], so callers do not need to know which backend they got.

use machine_core::{OpenError, SpiController, SpiDevice, SpiError, Transfer};

use std::io;
use std::os::fd::RawFd;

/// Information about a programmer
pub struct ProgrammerInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available programmers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory spidev emulator for testing (loopback)",
    });

    #[cfg(feature = "linux-spi")]
    programmers.push(ProgrammerInfo {
        name: "linux_spi",
        aliases: &["linux-spi", "spidev"],
        description: "Linux spidev interface (dev=/dev/spidevX.Y,spispeed=<kHz>,mode=<0-3>)",
    });

    programmers
}

/// Generate help text listing all available programmers
pub fn programmer_help() -> String {
    let programmers = available_programmers();

    if programmers.is_empty() {
        return "No programmers available (recompile with programmer features enabled)".to_string();
    }

    let mut help = String::from("Available programmers:\n");
    for p in &programmers {
        help.push_str(&format!("  {:12} - {}\n", p.name, p.description));
    }
    help
}

/// Resolve a programmer name or alias to its primary name
pub fn find_programmer(name: &str) -> Option<&'static str> {
    available_programmers()
        .into_iter()
        .find(|p| p.name == name || p.aliases.contains(&name))
        .map(|p| p.name)
}

/// Split a programmer string into its name and `key=value` options
///
/// Options without `=` are ignored.
pub fn parse_programmer_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

/// Controller of whichever backend a programmer string selected
#[derive(Debug)]
pub enum AnySpi {
    /// Kernel spidev handle
    #[cfg(feature = "linux-spi")]
    Linux(machine_linux_spi::Spidev),
    /// In-memory emulator
    #[cfg(feature = "dummy")]
    Dummy(machine_dummy::DummySpi),
}

macro_rules! dispatch {
    ($value:expr, $binding:pat => $body:expr) => {
        match $value {
            #[cfg(feature = "linux-spi")]
            AnySpi::Linux($binding) => $body,
            #[cfg(feature = "dummy")]
            AnySpi::Dummy($binding) => $body,
        }
    };
}

impl SpiController for AnySpi {
    fn raw_fd(&self) -> RawFd {
        dispatch!(*self, ref spi => spi.raw_fd())
    }

    fn read_mode(&self) -> io::Result<u8> {
        dispatch!(*self, ref spi => spi.read_mode())
    }

    fn write_mode(&mut self, mode: u8) -> io::Result<()> {
        dispatch!(*self, ref mut spi => spi.write_mode(mode))
    }

    fn read_max_speed_hz(&self) -> io::Result<u32> {
        dispatch!(*self, ref spi => spi.read_max_speed_hz())
    }

    fn write_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()> {
        dispatch!(*self, ref mut spi => spi.write_max_speed_hz(speed_hz))
    }

    fn read_bits_per_word(&self) -> io::Result<u8> {
        dispatch!(*self, ref spi => spi.read_bits_per_word())
    }

    fn write_bits_per_word(&mut self, bits: u8) -> io::Result<()> {
        dispatch!(*self, ref mut spi => spi.write_bits_per_word(bits))
    }

    fn message(&mut self, transfers: &mut [Transfer<'_>]) -> io::Result<()> {
        dispatch!(*self, ref mut spi => spi.message(transfers))
    }

    fn max_message_size(&self) -> Option<usize> {
        dispatch!(*self, ref spi => spi.max_message_size())
    }

    fn close(self) -> io::Result<()> {
        dispatch!(self, spi => spi.close())
    }
}

/// Open and configure the device described by a programmer string
///
/// The programmer string can be just the name (e.g. `"dummy"`) or include
/// options (e.g. `"linux_spi:dev=/dev/spidev0.0,mode=3"`). See
/// [`machine_core::parse_options`] for the recognized keys. The dummy
/// programmer does not need a `dev` option.
#[allow(unused_variables)]
pub fn open_spi(programmer: &str) -> Result<SpiDevice<AnySpi>, OpenError<AnySpi>> {
    let (name, options) = parse_programmer_string(programmer);

    let Some(canonical_name) = find_programmer(name) else {
        log::error!("Unknown programmer: {}\n{}", name, programmer_help());
        return Err(SpiError::UnknownProgrammer(name.to_string()).into());
    };

    match canonical_name {
        #[cfg(feature = "dummy")]
        "dummy" => {
            log::info!("Opening dummy programmer...");

            // A later dev= option overrides the placeholder path
            let options: Vec<_> = std::iter::once(("dev", "dummy"))
                .chain(options)
                .collect();
            let config = machine_core::parse_options(&options)?;

            SpiDevice::configure(AnySpi::Dummy(machine_dummy::DummySpi::new_default()), &config)
        }

        #[cfg(feature = "linux-spi")]
        "linux_spi" => {
            log::info!("Opening Linux SPI programmer...");

            let config = machine_core::parse_options(&options)?;
            let spidev = machine_linux_spi::Spidev::open(&config.device)?;

            SpiDevice::configure(AnySpi::Linux(spidev), &config)
        }

        _ => Err(SpiError::UnknownProgrammer(name.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_parse_programmer_string() {
        assert_eq!(parse_programmer_string("dummy"), ("dummy", vec![]));
        assert_eq!(
            parse_programmer_string("linux_spi:dev=/dev/spidev0.0,mode=3,junk"),
            ("linux_spi", vec![("dev", "/dev/spidev0.0"), ("mode", "3")])
        );
    }

    #[test]
    fn test_find_programmer() {
        #[cfg(feature = "linux-spi")]
        {
            assert_eq!(find_programmer("spidev"), Some("linux_spi"));
            assert_eq!(find_programmer("linux-spi"), Some("linux_spi"));
        }
        #[cfg(feature = "dummy")]
        assert_eq!(find_programmer("dummy"), Some("dummy"));
        assert_eq!(find_programmer("ch341a"), None);
    }

    #[test]
    fn test_programmer_help_lists_programmers() {
        let help = programmer_help();
        for p in available_programmers() {
            assert!(help.contains(p.name));
        }
    }

    #[test]
    fn test_open_unknown_programmer() {
        init_logger();
        let (error, device) = open_spi("ch341a:index=1").unwrap_err().into_parts();
        assert!(matches!(error, SpiError::UnknownProgrammer(ref name) if name == "ch341a"));
        assert!(error.is_validation());
        assert!(device.is_none());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_open_dummy() {
        init_logger();
        let mut spi = open_spi("dummy:mode=3,spispeed=2000,bit_order=lsb").unwrap();
        assert_eq!(spi.devpath(), "dummy");
        assert_eq!(spi.mode().unwrap(), 3);
        assert_eq!(spi.max_speed_hz().unwrap(), 2_000_000);
        assert_eq!(spi.bit_order().unwrap(), machine_core::BitOrder::Lsb);

        assert_eq!(spi.transfer(&[0x9F, 0x01]).unwrap(), [0x9F, 0x01]);
        assert!(matches!(spi.get_ref(), Some(AnySpi::Dummy(_))));

        spi.close().unwrap();
        assert!(matches!(spi.mode(), Err(SpiError::Closed)));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_open_dummy_with_dev() {
        init_logger();
        let spi = open_spi("dummy:dev=/dev/spidev9.9").unwrap();
        assert_eq!(spi.devpath(), "/dev/spidev9.9");
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_open_dummy_bad_option() {
        init_logger();
        let (error, device) = open_spi("dummy:mode=4").unwrap_err().into_parts();
        assert!(matches!(error, SpiError::InvalidMode(4)));
        assert!(device.is_none());
    }

    #[cfg(feature = "linux-spi")]
    #[test]
    fn test_open_linux_spi_requires_dev() {
        init_logger();
        let (error, _) = open_spi("spidev:mode=1").unwrap_err().into_parts();
        assert!(matches!(error, SpiError::NoDevice));
    }

    #[cfg(feature = "linux-spi")]
    #[test]
    fn test_open_linux_spi_missing_device() {
        init_logger();
        let (error, device) = open_spi("linux_spi:dev=/dev/spidev-does-not-exist.0")
            .unwrap_err()
            .into_parts();
        assert!(matches!(error, SpiError::OpenFailed { .. }));
        assert!(error.is_os_error());
        assert!(device.is_none());
    }
}
