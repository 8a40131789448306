//! Tests for item, reserve, cancel and inspection subcommands.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;

#[test]
fn cli_parse_item() {
    match parse(&["seatgate", "item", "7", "20"]) {
        CliCommand::Item { id, limit } => {
            assert_eq!(id, 7);
            assert_eq!(limit, 20);
        }
        _ => panic!("expected Item"),
    }
}

#[test]
fn cli_item_rejects_negative_limit() {
    assert!(Cli::try_parse_from(["seatgate", "item", "7", "-1"]).is_err());
}

#[test]
fn cli_parse_reserve() {
    match parse(&["seatgate", "reserve", "1", "42"]) {
        CliCommand::Reserve { item, requester } => {
            assert_eq!(item, 1);
            assert_eq!(requester, 42);
        }
        _ => panic!("expected Reserve"),
    }
}

#[test]
fn cli_parse_cancel_and_cancel_reservation() {
    match parse(&["seatgate", "cancel", "1", "42"]) {
        CliCommand::Cancel { item, requester } => {
            assert_eq!(item, 1);
            assert_eq!(requester, 42);
        }
        _ => panic!("expected Cancel"),
    }
    match parse(&["seatgate", "cancel-reservation", "9"]) {
        CliCommand::CancelReservation { id } => assert_eq!(id, 9),
        _ => panic!("expected CancelReservation"),
    }
}

#[test]
fn cli_parse_status_optional_item() {
    assert!(matches!(
        parse(&["seatgate", "status"]),
        CliCommand::Status { item: None }
    ));
    assert!(matches!(
        parse(&["seatgate", "status", "3"]),
        CliCommand::Status { item: Some(3) }
    ));
}

#[test]
fn cli_parse_item_scoped_commands() {
    assert!(matches!(parse(&["seatgate", "promote", "2"]), CliCommand::Promote { item: 2 }));
    assert!(matches!(parse(&["seatgate", "waitlist", "2"]), CliCommand::Waitlist { item: 2 }));
    assert!(matches!(parse(&["seatgate", "reconcile", "2"]), CliCommand::Reconcile { item: 2 }));
}

#[test]
fn cli_reserve_requires_requester() {
    assert!(Cli::try_parse_from(["seatgate", "reserve", "1"]).is_err());
}
