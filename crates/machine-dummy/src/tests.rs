use super::*;
use machine_core::{BitOrder, ModeFlags, SpiError};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn open_default() -> SpiDevice<DummySpi> {
    init_logger();
    open_dummy(DummySpi::new_default(), &SpiConfig::new("/dev/spidev0.0")).unwrap()
}

fn ops(spi: &SpiDevice<DummySpi>) -> Vec<DummyOp> {
    spi.get_ref().unwrap().ops()
}

#[test]
fn test_open_applies_config() {
    init_logger();
    let config = SpiConfig::new("/dev/spidev1.2")
        .with_mode(3)
        .with_speed(2_000_000)
        .with_bit_order(BitOrder::Lsb)
        .with_bits_per_word(16)
        .with_extra_flags(ModeFlags::CS_HIGH.bits());
    let spi = open_dummy(DummySpi::new_default(), &config).unwrap();

    assert_eq!(spi.devpath(), "/dev/spidev1.2");
    assert_eq!(spi.fd(), Some(3));
    assert_eq!(spi.get_ref().unwrap().mode_register(), 0x0F);
    assert_eq!(
        ops(&spi),
        [
            DummyOp::WriteMode,
            DummyOp::ReadMode,
            DummyOp::WriteMaxSpeed,
            DummyOp::ReadMaxSpeed,
            DummyOp::WriteBitsPerWord,
            DummyOp::ReadBitsPerWord,
        ]
    );

    assert_eq!(spi.mode().unwrap(), 3);
    assert_eq!(spi.max_speed_hz().unwrap(), 2_000_000);
    assert_eq!(spi.bit_order().unwrap(), BitOrder::Lsb);
    assert_eq!(spi.bits_per_word().unwrap(), 16);
    assert_eq!(spi.extra_flags().unwrap(), 0x04);
}

#[test]
fn test_open_readback_mismatch_is_not_an_error() {
    init_logger();
    let controller = DummySpi::new(DummyConfig {
        speed_limit_hz: Some(1_000_000),
        ..Default::default()
    });
    let config = SpiConfig::new("/dev/spidev0.0").with_speed(50_000_000);
    let spi = open_dummy(controller, &config).unwrap();
    assert_eq!(spi.max_speed_hz().unwrap(), 1_000_000);
}

#[test]
fn test_partial_open_returns_device() {
    init_logger();
    let controller = DummySpi::new_default().with_fault(DummyOp::WriteMaxSpeed, 22);
    let config = SpiConfig::new("/dev/spidev0.0").with_mode(2);

    let err = open_dummy(controller, &config).unwrap_err();
    assert!(matches!(
        err.error(),
        SpiError::SetSpeedFailed { speed: 1_000, .. }
    ));

    let (_, device) = err.into_parts();
    let mut spi = device.unwrap();
    assert!(spi.is_open());
    // Mode went through, bits per word was never written
    assert_eq!(spi.mode().unwrap(), 2);
    assert!(!ops(&spi).contains(&DummyOp::WriteBitsPerWord));
    spi.close().unwrap();
}

#[test]
fn test_open_error_converts_to_spi_error() {
    init_logger();
    fn open_it() -> machine_core::Result<SpiDevice<DummySpi>> {
        let controller = DummySpi::new_default().with_fault(DummyOp::ReadMode, 5);
        Ok(open_dummy(controller, &SpiConfig::new("/dev/spidev0.0"))?)
    }

    let err = open_it().unwrap_err();
    assert!(matches!(err, SpiError::SetModeFailed { mode: 0, .. }));
    assert_eq!(err.raw_os_error(), Some(5));
}

#[test]
fn test_unsupported_mode_bits_rejected() {
    init_logger();
    let controller = DummySpi::new(DummyConfig {
        supported_mode_bits: 0x0F,
        ..Default::default()
    });
    let config = SpiConfig::new("/dev/spidev0.0").with_extra_flags(ModeFlags::LOOP.bits());
    let err = open_dummy(controller, &config).unwrap_err();
    assert_eq!(err.error().raw_os_error(), Some(EINVAL));
}

#[test]
fn test_mode_round_trip_preserves_other_fields() {
    let mut spi = open_default();
    spi.set_extra_flags(0x24).unwrap();
    spi.set_bit_order(BitOrder::Lsb).unwrap();

    for mode in 0..=3 {
        spi.set_mode(mode).unwrap();
        assert_eq!(spi.mode().unwrap(), mode);
        assert_eq!(spi.extra_flags().unwrap(), 0x24);
        assert_eq!(spi.bit_order().unwrap(), BitOrder::Lsb);
    }
}

#[test]
fn test_bit_order_round_trip_preserves_other_fields() {
    let mut spi = open_default();
    spi.set_mode(1).unwrap();
    spi.set_extra_flags(0x80).unwrap();

    spi.set_bit_order("LSB".parse().unwrap()).unwrap();
    assert_eq!(spi.bit_order().unwrap(), BitOrder::Lsb);
    assert_eq!(spi.get_ref().unwrap().mode_register(), 0x89);

    spi.set_bit_order(BitOrder::Msb).unwrap();
    assert_eq!(spi.bit_order().unwrap(), BitOrder::Msb);
    assert_eq!(spi.mode().unwrap(), 1);
    assert_eq!(spi.extra_flags().unwrap(), 0x80);
}

#[test]
fn test_bits_per_word_round_trip() {
    let mut spi = open_default();
    for bits in 0..=255u8 {
        spi.set_bits_per_word(bits).unwrap();
        assert_eq!(spi.bits_per_word().unwrap(), bits);
    }
}

#[test]
fn test_extra_flags_round_trip() {
    let mut spi = open_default();
    spi.set_mode(3).unwrap();
    for flags in (0..=255u8).filter(|f| f & ModeFlags::RESERVED.bits() == 0) {
        spi.set_extra_flags(flags).unwrap();
        assert_eq!(spi.extra_flags().unwrap(), flags);
        assert_eq!(spi.mode().unwrap(), 3);
    }
}

#[test]
fn test_extra_flags_overlapping_mode_bits_are_ored_in() {
    let mut spi = open_default();
    spi.set_mode(2).unwrap();

    spi.set_extra_flags(0x01).unwrap();
    assert_eq!(spi.get_ref().unwrap().mode_register(), 0x03);
    assert_eq!(spi.mode().unwrap(), 3);
    assert_eq!(spi.extra_flags().unwrap(), 0x00);

    spi.set_extra_flags(0x0B).unwrap();
    assert_eq!(spi.mode().unwrap(), 3);
    assert_eq!(spi.bit_order().unwrap(), BitOrder::Lsb);

    // Aliased bits are not cleared by later extra flags
    spi.set_extra_flags(0x20).unwrap();
    assert_eq!(spi.get_ref().unwrap().mode_register(), 0x2B);
}

#[test]
fn test_open_with_overlapping_extra_flags() {
    init_logger();
    let config = SpiConfig::new("/dev/spidev0.0").with_extra_flags(0x01);
    let spi = open_dummy(DummySpi::new_default(), &config).unwrap();
    assert_eq!(spi.mode().unwrap(), 1);
    assert_eq!(spi.extra_flags().unwrap(), 0x00);
}

#[test]
fn test_max_speed_round_trip() {
    let mut spi = open_default();
    spi.set_max_speed_hz(12_500_000).unwrap();
    assert_eq!(spi.max_speed_hz().unwrap(), 12_500_000);

    let hz = machine_core::speed_from_f64(3_999_999.7).unwrap();
    spi.set_max_speed_hz(hz).unwrap();
    assert_eq!(spi.max_speed_hz().unwrap(), 3_999_999);
}

#[test]
fn test_validation_happens_before_ioctl() {
    let mut spi = open_default();
    spi.get_mut().unwrap().clear_history();

    assert!(matches!(spi.set_mode(4), Err(SpiError::InvalidMode(4))));
    assert!(matches!(
        spi.set_max_speed_hz(0),
        Err(SpiError::InvalidSpeed(_))
    ));
    let tx = [1u8, 2, 3];
    let mut rx = [0u8; 2];
    assert!(matches!(
        spi.transfer_into(&tx, &mut rx),
        Err(SpiError::LengthMismatch { tx: 3, rx: 2 })
    ));
    assert!(matches!(spi.message(&mut []), Err(SpiError::EmptyMessage)));

    assert!(ops(&spi).is_empty());
}

#[test]
fn test_ioctl_failure_names_the_property() {
    let mut spi = open_default();
    spi.get_mut().unwrap().fail_next(DummyOp::ReadMode, 5);
    assert!(matches!(spi.mode(), Err(SpiError::GetModeFailed(_))));

    spi.get_mut().unwrap().fail_next(DummyOp::WriteMode, 5);
    assert!(matches!(
        spi.set_bit_order(BitOrder::Lsb),
        Err(SpiError::SetModeFailed { .. })
    ));

    spi.get_mut().unwrap().fail_next(DummyOp::ReadBitsPerWord, 5);
    assert!(matches!(
        spi.bits_per_word(),
        Err(SpiError::GetBitsPerWordFailed(_))
    ));

    spi.get_mut().unwrap().fail_next(DummyOp::ReadMaxSpeed, 5);
    assert!(matches!(
        spi.max_speed_hz(),
        Err(SpiError::GetSpeedFailed(_))
    ));

    // Faults are consumed
    assert_eq!(spi.mode().unwrap(), 0);
}

#[test]
fn test_transfer_loopback() {
    let mut spi = open_default();
    let rx = spi.transfer(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
    assert_eq!(rx, [0xDE, 0xAD, 0xBE, 0xEF]);

    let recorded = spi.get_ref().unwrap().transfers();
    assert_eq!(recorded.len(), 1);
    assert_eq!(
        recorded[0],
        RecordedTransfer {
            tx: Some(vec![0xDE, 0xAD, 0xBE, 0xEF]),
            len: 4,
            ..Default::default()
        }
    );
}

#[test]
fn test_transfer_empty_still_issues_ioctl() {
    let mut spi = open_default();
    spi.get_mut().unwrap().clear_history();

    let rx = spi.transfer(&[]).unwrap();
    assert!(rx.is_empty());
    assert_eq!(ops(&spi), [DummyOp::Message]);
    assert_eq!(spi.get_ref().unwrap().transfers()[0].len, 0);
}

#[test]
fn test_transfer_preserves_shape() {
    let mut spi = open_default();
    spi.get_mut()
        .unwrap()
        .set_response(DummyResponse::Script([0x10, 0x20, 0x30].into()));

    let rx: [u8; 3] = spi.transfer_array(&[1, 2, 3]).unwrap();
    assert_eq!(rx, [0x10, 0x20, 0x30]);

    spi.get_mut().unwrap().set_response(DummyResponse::Fill(0x5A));
    let values: Vec<i32> = spi.transfer_values(&[1i32, 2, 255]).unwrap();
    assert_eq!(values, [0x5A, 0x5A, 0x5A]);

    let mut buf = [0x01u8, 0x02];
    spi.get_mut().unwrap().set_response(DummyResponse::Loopback);
    spi.transfer_in_place(&mut buf).unwrap();
    assert_eq!(buf, [0x01, 0x02]);

    let mut rx = [0u8; 2];
    spi.transfer_into(&[7, 8], &mut rx).unwrap();
    assert_eq!(rx, [7, 8]);
}

#[test]
fn test_transfer_values_rejects_out_of_range() {
    let mut spi = open_default();
    spi.get_mut().unwrap().clear_history();

    let err = spi.transfer_values(&[1i32, 256, 3]).unwrap_err();
    assert!(matches!(err, SpiError::InvalidDataByte { index: 1, .. }));
    assert!(spi.transfer_values(&[-1i16]).is_err());
    assert!(ops(&spi).is_empty());
}

#[test]
fn test_message_size_limit() {
    init_logger();
    let controller = DummySpi::new(DummyConfig {
        max_message_size: Some(4),
        ..Default::default()
    });
    let mut spi = open_dummy(controller, &SpiConfig::new("/dev/spidev0.0")).unwrap();
    spi.get_mut().unwrap().clear_history();

    let err = spi.transfer(&[0u8; 5]).unwrap_err();
    assert!(matches!(err, SpiError::MessageTooLarge { len: 5, max: 4 }));
    assert!(err.is_validation());
    assert!(ops(&spi).is_empty());

    // The limit applies per direction, not to the sum
    let cmd = [0x03u8, 0, 0, 0];
    let mut data = [0u8; 4];
    spi.message(&mut [Transfer::write(&cmd), Transfer::read(&mut data)])
        .unwrap();
    assert_eq!(ops(&spi), [DummyOp::Message]);
}

#[test]
fn test_transfer_failure() {
    let mut spi = open_default();
    spi.get_mut().unwrap().fail_next(DummyOp::Message, 90);
    let err = spi.transfer(&[0u8; 8]).unwrap_err();
    assert!(matches!(err, SpiError::TransferFailed { len: 8, .. }));
    assert_eq!(err.raw_os_error(), Some(90));
}

#[test]
fn test_message_write_then_read() {
    let mut spi = open_default();
    spi.get_mut()
        .unwrap()
        .set_response(DummyResponse::Script([0xEF, 0x40, 0x18].into()));

    let cmd = [0x9Fu8];
    let mut id = [0u8; 3];
    spi.message(&mut [
        Transfer::write(&cmd).speed_hz(1_000_000),
        Transfer::read(&mut id).delay_usecs(10).cs_change(true),
    ])
    .unwrap();
    assert_eq!(id, [0xEF, 0x40, 0x18]);

    let recorded = spi.get_ref().unwrap().transfers();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].tx.as_deref(), Some(&[0x9F][..]));
    assert_eq!(recorded[0].speed_hz, 1_000_000);
    assert_eq!(recorded[1].tx, None);
    assert_eq!(recorded[1].len, 3);
    assert_eq!(recorded[1].delay_usecs, 10);
    assert!(recorded[1].cs_change);
}

#[test]
fn test_close_is_idempotent() {
    let mut spi = open_default();
    spi.close().unwrap();
    assert!(!spi.is_open());
    assert_eq!(spi.fd(), None);
    spi.close().unwrap();
    assert_eq!(spi.devpath(), "/dev/spidev0.0");
}

#[test]
fn test_close_failure_still_marks_closed() {
    let mut spi = open_default();
    spi.get_mut().unwrap().fail_next(DummyOp::Close, 9);

    let err = spi.close().unwrap_err();
    assert!(matches!(err, SpiError::CloseFailed(_)));
    assert!(!spi.is_open());
    spi.close().unwrap();
}

#[test]
fn test_operations_after_close_fail() {
    let mut spi = open_default();
    spi.close().unwrap();

    assert!(matches!(spi.mode(), Err(SpiError::Closed)));
    assert!(matches!(spi.set_mode(1), Err(SpiError::Closed)));
    assert!(matches!(spi.max_speed_hz(), Err(SpiError::Closed)));
    assert!(matches!(spi.set_max_speed_hz(1000), Err(SpiError::Closed)));
    assert!(matches!(spi.bit_order(), Err(SpiError::Closed)));
    assert!(matches!(
        spi.set_bit_order(BitOrder::Lsb),
        Err(SpiError::Closed)
    ));
    assert!(matches!(spi.bits_per_word(), Err(SpiError::Closed)));
    assert!(matches!(spi.set_bits_per_word(8), Err(SpiError::Closed)));
    assert!(matches!(spi.extra_flags(), Err(SpiError::Closed)));
    assert!(matches!(spi.set_extra_flags(0x10), Err(SpiError::Closed)));
    assert!(matches!(spi.transfer(&[1, 2]), Err(SpiError::Closed)));
    assert!(matches!(spi.transfer(&[]), Err(SpiError::Closed)));
    assert!(matches!(spi.settings(), Err(SpiError::Closed)));
}

#[test]
fn test_display() {
    init_logger();
    let config = SpiConfig::new("/dev/spidev0.1")
        .with_mode(2)
        .with_speed(250_000)
        .with_bit_order(BitOrder::Lsb)
        .with_extra_flags(0x20);
    let mut spi = open_dummy(DummySpi::new_default(), &config).unwrap();

    assert_eq!(
        spi.to_string(),
        "SPI (device=/dev/spidev0.1, fd=3, mode=2, max_speed_hz=250000, bit_order=lsb, bits_per_word=8, extra_flags=0x20)"
    );

    let settings = spi.settings().unwrap();
    assert_eq!(settings.mode, 2);
    assert_eq!(settings.extra_flags, 0x20);

    spi.close().unwrap();
    assert_eq!(spi.to_string(), "SPI (device=/dev/spidev0.1, closed)");
}

#[test]
fn test_drop_closes_once() {
    init_logger();
    let controller = DummySpi::new_default();
    let journal = controller.journal();
    let spi = open_dummy(controller, &SpiConfig::new("/dev/spidev0.0")).unwrap();
    assert_eq!(journal.count(DummyOp::Close), 0);

    drop(spi);
    assert_eq!(journal.count(DummyOp::Close), 1);
}

#[test]
fn test_close_then_drop_closes_once() {
    init_logger();
    let controller = DummySpi::new_default();
    let journal = controller.journal();
    let mut spi = open_dummy(controller, &SpiConfig::new("/dev/spidev0.0")).unwrap();

    spi.close().unwrap();
    spi.close().unwrap();
    drop(spi);
    assert_eq!(journal.count(DummyOp::Close), 1);
    assert_eq!(journal.ops().last(), Some(&DummyOp::Close));
}

#[test]
fn test_failed_close_is_not_retried_on_drop() {
    init_logger();
    let controller = DummySpi::new_default().with_fault(DummyOp::Close, 5);
    let journal = controller.journal();
    let mut spi = open_dummy(controller, &SpiConfig::new("/dev/spidev0.0")).unwrap();

    assert!(spi.close().is_err());
    drop(spi);
    assert_eq!(journal.count(DummyOp::Close), 1);
}

#[test]
fn test_dropping_open_error_closes_partial_device() {
    init_logger();
    let controller = DummySpi::new_default().with_fault(DummyOp::WriteBitsPerWord, 22);
    let journal = controller.journal();

    let err = open_dummy(controller, &SpiConfig::new("/dev/spidev0.0")).unwrap_err();
    assert!(err.device().is_some());
    assert_eq!(journal.count(DummyOp::Close), 0);

    drop(err);
    assert_eq!(journal.count(DummyOp::Close), 1);
}

#[test]
fn test_open_error_into_spi_error_closes_partial_device() {
    init_logger();
    let controller = DummySpi::new_default().with_fault(DummyOp::WriteMode, 22);
    let journal = controller.journal();

    let err: SpiError = open_dummy(controller, &SpiConfig::new("/dev/spidev0.0"))
        .unwrap_err()
        .into();
    assert!(matches!(err, SpiError::SetModeFailed { .. }));
    assert_eq!(journal.count(DummyOp::Close), 1);
}
