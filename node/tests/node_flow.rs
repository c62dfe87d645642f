//! End-to-end scenarios over the in-memory collaborators

use cornhole_node::mock::{ManualPlatform, MemoryStore, MockCompanion, MockRadio, RecordingRenderer};
use cornhole_node::settings::{self, keys};
use cornhole_node::{
    BoardStatus, Inboxes, Node, PeerAddress, Peripherals, PreferenceStore, Rgb, Role, Settings,
};

type TestIo = Peripherals<MockRadio, MockCompanion, MemoryStore, RecordingRenderer, ManualPlatform>;
type TestNode<'q> = Node<'q, MockRadio, MockCompanion, MemoryStore, RecordingRenderer, ManualPlatform>;

const LOW: PeerAddress = PeerAddress::new([0x24, 0x6F, 0x28, 0x10, 0x00, 0x01]);
const HIGH: PeerAddress = PeerAddress::new([0x24, 0x6F, 0x28, 0x10, 0x00, 0x02]);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn io(address: PeerAddress, role: Role) -> TestIo {
    let mut store = MemoryStore::new();
    Settings::initialize_store(&mut store);
    settings::save_role(&mut store, role).unwrap();
    Peripherals {
        radio: MockRadio::new(address),
        companion: MockCompanion::default(),
        store,
        renderer: RecordingRenderer::default(),
        platform: ManualPlatform::default(),
    }
}

#[test]
fn test_conflicting_secondaries_elect_lower_address() {
    init_logger();
    let mut inboxes = Inboxes::new();
    let (mut tx, rx) = inboxes.split();
    // The partner heard our announcement too and answered it
    tx.radio_received(HIGH, b"ROLE: SECONDARY").unwrap();
    tx.radio_received(HIGH, b"We are both: SECONDARY").unwrap();

    let mut node: TestNode = Node::new(io(LOW, Role::Secondary), rx);
    let outcome = node.boot();

    assert_eq!(outcome.role, Role::Primary);
    assert!(outcome.seen && outcome.changed && !outcome.promoted);
    assert_eq!(
        node.io().radio.sent_to(PeerAddress::BROADCAST),
        ["ROLE: SECONDARY", "We are both: SECONDARY"]
    );
    assert_eq!(settings::load_role(&node.io().store), Role::Primary);
    assert_eq!(node.io().companion.advertised, 1);
    assert_eq!(node.peers().all(), &[HIGH]);
}

#[test]
fn test_unanswered_conflict_keeps_role() {
    init_logger();
    let mut inboxes = Inboxes::new();
    let (mut tx, rx) = inboxes.split();
    // Our announcement was lost, so the partner will concede instead of us
    tx.radio_received(HIGH, b"ROLE: SECONDARY").unwrap();

    let mut node: TestNode = Node::new(io(LOW, Role::Secondary), rx);
    let outcome = node.boot();

    assert_eq!(outcome.role, Role::Secondary);
    assert!(outcome.seen && !outcome.changed && !outcome.promoted);
    assert_eq!(
        node.io().radio.sent_to(PeerAddress::BROADCAST),
        ["ROLE: SECONDARY", "We are both: SECONDARY"]
    );
    assert_eq!(node.io().companion.advertised, 0);
}

#[test]
fn test_lone_secondary_promotes_itself() {
    init_logger();
    let mut inboxes = Inboxes::new();
    let (_tx, rx) = inboxes.split();
    let mut node: TestNode = Node::new(io(HIGH, Role::Secondary), rx);

    let outcome = node.boot();
    assert!(outcome.promoted);
    assert_eq!(node.role(), Role::Primary);
    assert_eq!(settings::load_role(&node.io().store), Role::Primary);
    // Stagger plus the whole election window
    assert!(node.io().platform.now >= 300 + 2000);
}

#[test]
fn test_booting_primary_concedes_to_running_primary() {
    init_logger();
    let mut inboxes = Inboxes::new();
    let (mut tx, rx) = inboxes.split();
    tx.radio_received(LOW, b"We are both: PRIMARY").unwrap();

    let mut io = io(HIGH, Role::Primary);
    // Left over from the previous boot as PRIMARY
    io.companion.advertising = true;
    io.companion.connected = true;
    let mut node: TestNode = Node::new(io, rx);
    node.boot();
    assert_eq!(node.role(), Role::Secondary);
    assert_eq!(node.io().companion.advertised, 0);
    assert!(!node.io().companion.advertising);
    assert!(!node.io().companion.connected);

    tx.companion_written(b"BRIGHT:200;").unwrap();
    node.poll();
    assert_eq!(node.dispatcher().settings().brightness, 50);
}

#[test]
fn test_running_node_answers_but_keeps_role() {
    init_logger();
    let mut inboxes = Inboxes::new();
    let (mut tx, rx) = inboxes.split();
    let mut node: TestNode = Node::new(io(LOW, Role::Primary), rx);
    node.boot();
    node.io_mut().radio.sent.clear();

    tx.radio_received(HIGH, b"ROLE: PRIMARY").unwrap();
    tx.radio_received(HIGH, b"We are both: PRIMARY").unwrap();
    node.poll();

    assert_eq!(node.role(), Role::Primary);
    assert_eq!(
        node.io().radio.sent_to(PeerAddress::BROADCAST),
        ["We are both: PRIMARY"]
    );
}

#[test]
fn test_companion_commands_are_clamped_applied_and_broadcast() {
    init_logger();
    let mut inboxes = Inboxes::new();
    let (mut tx, rx) = inboxes.split();
    tx.radio_received(HIGH, b"ROLE: SECONDARY").unwrap();
    let mut node: TestNode = Node::new(io(LOW, Role::Primary), rx);
    node.boot();

    // Writes split at arbitrary points
    tx.companion_written(b"BRI").unwrap();
    tx.companion_written(b"GHT:999;IC:-5,30").unwrap();
    tx.companion_written(b"0,10;SPEED:-3;").unwrap();
    node.poll();

    let settings = node.dispatcher().settings();
    assert_eq!(settings.brightness, 255);
    assert_eq!(settings.initial_color, Rgb::new(0, 255, 10));
    assert_eq!(settings.effect_speed, 25);

    let store = &node.io().store;
    assert_eq!(store.get_i32(keys::BRIGHTNESS), Some(255));
    assert_eq!(store.get_i32(keys::INITIAL_COLOR[0]), Some(0));
    assert_eq!(store.get_i32(keys::INITIAL_COLOR[1]), Some(255));

    assert_eq!(node.io().radio.sent_to(HIGH), ["BRIGHT:255", "IC:0,255,10"]);
}

#[test]
fn test_clear_all_then_reboot_restores_defaults() {
    init_logger();
    let mut inboxes = Inboxes::new();
    let (mut tx, rx) = inboxes.split();
    let mut node: TestNode = Node::new(io(LOW, Role::Primary), rx);
    node.boot();

    tx.companion_written(b"B1:Left Lane;BRIGHT:10;").unwrap();
    node.poll();
    assert_eq!(node.dispatcher().settings().board1_name.as_str(), "Left Lane");

    tx.companion_written(b"CLEAR_ALL;").unwrap();
    node.poll();
    assert!(node.restart_requested());
    assert_eq!(node.io().platform.restarts, 1);
    assert!(node.io().store.is_empty());

    let (io, mut rx) = node.into_parts();
    rx.discard_pending();
    let node: TestNode = Node::new(io, rx);
    assert_eq!(node.dispatcher().settings(), &Settings::default());
    assert_eq!(node.io().store.get_bool(keys::STORE_INITIALIZED), Some(true));
    assert_eq!(node.role(), Role::Primary);
}

#[test]
fn test_set_role_persists_notifies_peer_and_restarts() {
    init_logger();
    let mut inboxes = Inboxes::new();
    let (mut tx, rx) = inboxes.split();
    tx.radio_received(HIGH, b"ROLE: SECONDARY").unwrap();
    let mut node: TestNode = Node::new(io(LOW, Role::Primary), rx);
    node.boot();

    tx.companion_written(b"SET_ROLE:SECONDARY;").unwrap();
    node.poll();

    assert_eq!(settings::load_role(&node.io().store), Role::Secondary);
    assert_eq!(node.io().radio.sent_to(HIGH), ["SET_ROLE:PRIMARY"]);
    assert!(node.restart_requested());
}

#[test]
fn test_board_info_round_trip_between_two_nodes() {
    init_logger();
    let mut primary_inbox = Inboxes::new();
    let (mut to_primary, primary_rx) = primary_inbox.split();
    let mut secondary_inbox = Inboxes::new();
    let (mut to_secondary, secondary_rx) = secondary_inbox.split();

    let mut primary: TestNode = Node::new(io(LOW, Role::Primary), primary_rx);
    let mut secondary: TestNode = Node::new(io(HIGH, Role::Secondary), secondary_rx);
    primary.io_mut().companion.connected = true;

    // Both learn of each other
    to_primary.radio_received(HIGH, b"ROLE: SECONDARY").unwrap();
    to_secondary.radio_received(LOW, b"ROLE: PRIMARY").unwrap();
    primary.poll();
    secondary.poll();

    to_primary.companion_written(b"GET_INFO;").unwrap();
    primary.poll();
    let forwarded = primary.io().radio.sent_to(HIGH);
    assert_eq!(forwarded, ["GET_INFO"]);

    to_secondary.radio_received(LOW, forwarded[0].as_bytes()).unwrap();
    secondary.poll();
    let (dest, record) = secondary.io().radio.sent.last().cloned().unwrap();
    assert_eq!(dest, LOW);
    assert_eq!(record.len(), BoardStatus::SIZE);

    to_primary.radio_received(HIGH, &record).unwrap();
    primary.poll();

    let received = primary.io().companion.received();
    assert!(received.starts_with("r1:PRIMARY;n1:Board 1;m1:24:6f:28:10:00:01;i1:192.168.4.1;"));
    assert!(received.contains("r2:SECONDARY;n2:Board 2;m2:24:6f:28:10:00:02;"));
}

#[test]
fn test_radio_duplicates_are_processed_once() {
    init_logger();
    let mut inboxes = Inboxes::new();
    let (mut tx, rx) = inboxes.split();
    let mut node: TestNode = Node::new(io(LOW, Role::Primary), rx);
    node.io_mut().companion.connected = true;

    tx.radio_received(HIGH, b"Effect:Twinkle").unwrap();
    tx.radio_received(HIGH, b"Effect:Twinkle").unwrap();
    tx.radio_received(HIGH, b"ColorIndex:3").unwrap();
    node.poll();

    assert_eq!(
        node.io().companion.received(),
        "Effect:Twinkle;ColorIndex:3;"
    );
}
