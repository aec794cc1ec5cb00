//! Player authentication state machine
//!
//! One [`LoginProtocol`] drives one connection. Requests are handled strictly
//! one at a time: a request is fully answered (including any account store
//! round trip) before the next frame is read.
//!
//! Security failures (wrong session prefix, invalid realm selection) bump the
//! hack-attempt counter and are answered with a failure packet; the
//! connection is left open.
//!
//! Password hashing runs on the blocking pool so a login never stalls the
//! other connections sharing a runtime worker.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::auth::{
    hash_password_blocking, is_valid_username, normalize_username, verify_decoy_blocking,
    verify_password_blocking, Account, AccountStore, PasswordScheme, ACCESS_LEVEL_PLAYER,
};
use crate::config::ServerConfig;
use crate::error::FailureReason;
use crate::net::session::{Session, SessionKey, SessionState, SESSION_PREFIX_LEN};
use crate::protocol::packets::{ClientPacket, ServerPacket};
use crate::stats::GatewayStats;
use crate::world::WorldDirectory;

/// Login rules taken from configuration
#[derive(Debug, Clone, Copy)]
pub struct LoginPolicy {
    pub auto_create: bool,
    pub min_access_level: i16,
    pub password_scheme: PasswordScheme,
}

impl From<&ServerConfig> for LoginPolicy {
    fn from(config: &ServerConfig) -> Self {
        Self {
            auto_create: config.auto_create,
            min_access_level: config.min_access_level,
            password_scheme: config.password,
        }
    }
}

/// Per-connection view of a player: the registry handle plus the bound account
pub struct ClientSession {
    session: Arc<Session>,
    account: Option<Account>,
}

impl ClientSession {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            account: None,
        }
    }

    pub fn key(&self) -> SessionKey {
        self.session.key()
    }

    pub fn peer(&self) -> SocketAddr {
        self.session.address
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn handle(&self) -> &Arc<Session> {
        &self.session
    }

    fn bind_account(&mut self, account: Account) {
        self.session.set_username(&account.username);
        self.session.advance_state(SessionState::Authenticated);
        self.account = Some(account);
    }
}

/// Request dispatcher for the player login channel
pub struct LoginProtocol {
    accounts: Arc<dyn AccountStore>,
    worlds: Arc<WorldDirectory>,
    stats: Arc<GatewayStats>,
    policy: LoginPolicy,
}

impl LoginProtocol {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        worlds: Arc<WorldDirectory>,
        stats: Arc<GatewayStats>,
        policy: LoginPolicy,
    ) -> Self {
        Self {
            accounts,
            worlds,
            stats,
            policy,
        }
    }

    /// Handle one request. Returns the response to send, if any.
    pub async fn handle(
        &self,
        client: &mut ClientSession,
        packet: ClientPacket,
    ) -> Option<ServerPacket> {
        match packet {
            ClientPacket::RequestAuthLogin { username, password } => {
                Some(self.handle_auth_login(client, &username, &password).await)
            }
            ClientPacket::RequestPlay {
                session_prefix,
                server_id,
            } => Some(self.handle_play(client, &session_prefix, server_id)),
            ClientPacket::RequestServerList { session_prefix } => {
                Some(self.handle_server_list(client, &session_prefix))
            }
            ClientPacket::Unknown { opcode, payload } => {
                warn!(
                    session = %client.key(),
                    opcode = format_args!("0x{:02x}", opcode),
                    len = payload.len(),
                    "Unknown login packet, ignoring"
                );
                None
            }
        }
    }

    async fn handle_auth_login(
        &self,
        client: &mut ClientSession,
        raw_username: &str,
        password: &str,
    ) -> ServerPacket {
        if client.state() != SessionState::Connected {
            self.stats.record_hack_attempt();
            warn!(
                session = %client.key(),
                state = %client.state(),
                "Login request on an already authenticated session"
            );
            return login_fail(FailureReason::AccessFailed);
        }

        let username = normalize_username(raw_username);
        if !is_valid_username(&username) {
            self.stats.record_failed_login();
            warn!(session = %client.key(), "Login with malformed username");
            return login_fail(FailureReason::UserOrPassWrong);
        }

        let account = match self.accounts.find_by_username(&username).await {
            Ok(account) => account,
            Err(e) => {
                error!(
                    session = %client.key(),
                    username = %username,
                    "Account lookup failed: {}",
                    e
                );
                return login_fail(FailureReason::SystemError);
            }
        };

        let Some(account) = account else {
            if self.policy.auto_create {
                return self.create_account(client, &username, password).await;
            }
            verify_decoy_blocking(password, self.policy.password_scheme).await;
            self.stats.record_failed_login();
            info!(session = %client.key(), username = %username, "Unknown account");
            return login_fail(FailureReason::UserOrPassWrong);
        };

        let verified = match verify_password_blocking(password, &account.password_hash).await {
            Ok(verified) => verified,
            Err(e) => {
                error!(
                    session = %client.key(),
                    username = %username,
                    "Password verification failed: {}",
                    e
                );
                return login_fail(FailureReason::SystemError);
            }
        };

        if !verified {
            self.stats.record_failed_login();
            info!(session = %client.key(), username = %username, "Wrong password");
            return login_fail(FailureReason::UserOrPassWrong);
        }

        if account.access_level < self.policy.min_access_level {
            self.stats.record_failed_login();
            warn!(
                session = %client.key(),
                username = %username,
                access_level = account.access_level,
                "Account below minimum access level"
            );
            return login_fail(FailureReason::AccessFailed);
        }

        info!(session = %client.key(), username = %username, "Login successful");
        client.bind_account(account);
        self.stats.record_successful_login();
        ServerPacket::LoginOk {
            session_key: client.key(),
        }
    }

    async fn create_account(
        &self,
        client: &mut ClientSession,
        username: &str,
        password: &str,
    ) -> ServerPacket {
        let hashed = hash_password_blocking(password, self.policy.password_scheme).await;
        let password_hash = match hashed {
            Ok(hash) => hash,
            Err(e) => {
                self.stats.record_failed_account_creation();
                error!(username = %username, "Could not hash password: {}", e);
                return login_fail(FailureReason::SystemError);
            }
        };

        let id = match self
            .accounts
            .insert(username, &password_hash, ACCESS_LEVEL_PLAYER)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.stats.record_failed_account_creation();
                error!(username = %username, "Could not create account: {}", e);
                return login_fail(FailureReason::SystemError);
            }
        };

        info!(
            session = %client.key(),
            username = %username,
            account_id = id,
            "Account created"
        );

        client.bind_account(Account {
            id,
            username: username.to_string(),
            password_hash,
            access_level: ACCESS_LEVEL_PLAYER,
        });
        self.stats.record_successful_account_creation();
        ServerPacket::LoginOk {
            session_key: client.key(),
        }
    }

    fn handle_play(
        &self,
        client: &mut ClientSession,
        session_prefix: &[u8; SESSION_PREFIX_LEN],
        server_id: u8,
    ) -> ServerPacket {
        let Some(account) = client.account() else {
            self.stats.record_hack_attempt();
            warn!(session = %client.key(), "Play request before login");
            return play_fail(FailureReason::AccessFailed);
        };

        let world = self
            .worlds
            .get(server_id)
            .filter(|world| !world.testing || account.is_elevated());
        let Some(world) = world else {
            self.stats.record_hack_attempt();
            warn!(
                session = %client.key(),
                username = %account.username,
                server_id,
                "Play request for an invalid or restricted server"
            );
            return play_fail(FailureReason::AccessFailed);
        };

        if !client.key().matches_prefix(session_prefix) {
            self.stats.record_hack_attempt();
            warn!(
                session = %client.key(),
                username = %account.username,
                "Play request with mismatched session key"
            );
            return play_fail(FailureReason::AccessFailed);
        }

        // Unavailable realms are refused without counting a hack attempt
        if !world.online {
            info!(session = %client.key(), server_id, "Play request for an offline server");
            return play_fail(FailureReason::ServerMaintenance);
        }
        if world.current_players >= world.max_players && !account.is_elevated() {
            info!(session = %client.key(), server_id, "Play request for a full server");
            return play_fail(FailureReason::ServerOverloaded);
        }

        info!(
            session = %client.key(),
            username = %account.username,
            server_id,
            "Play granted"
        );
        client.session.advance_state(SessionState::ServerSelected);
        ServerPacket::PlayOk {
            play_key: client.key().suffix(),
            server_id,
        }
    }

    fn handle_server_list(
        &self,
        client: &mut ClientSession,
        session_prefix: &[u8; SESSION_PREFIX_LEN],
    ) -> ServerPacket {
        if client.account().is_none() || !client.key().matches_prefix(session_prefix) {
            self.stats.record_hack_attempt();
            warn!(
                session = %client.key(),
                authenticated = client.account().is_some(),
                "Server list request with mismatched session key"
            );
            return login_fail(FailureReason::AccessFailed);
        }

        debug!(session = %client.key(), "Sending server list");
        ServerPacket::server_list(&self.worlds.list(), client.peer().ip())
    }
}

fn login_fail(reason: FailureReason) -> ServerPacket {
    ServerPacket::LoginFail { reason }
}

fn play_fail(reason: FailureReason) -> ServerPacket {
    ServerPacket::PlayFail { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{hash_password, MemoryAccountStore, ACCESS_LEVEL_BANNED, ACCESS_LEVEL_GM};
    use crate::config::WorldServerConfig;
    use crate::error::StoreError;
    use crate::stats::StatsSnapshot;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;
    use std::time::{Duration, Instant};

    const FAST_BCRYPT: PasswordScheme = PasswordScheme::Bcrypt { cost: 4 };

    fn policy(auto_create: bool) -> LoginPolicy {
        LoginPolicy {
            auto_create,
            min_access_level: ACCESS_LEVEL_PLAYER,
            password_scheme: FAST_BCRYPT,
        }
    }

    fn worlds() -> Arc<WorldDirectory> {
        worlds_with(false)
    }

    fn worlds_with(require_registration: bool) -> Arc<WorldDirectory> {
        let world = |id: u8, testing: bool| WorldServerConfig {
            id,
            host: Ipv4Addr::new(203, 0, 113, id),
            internal_host: None,
            port: 7777,
            max_players: 1000,
            testing,
            pvp: false,
            age_limit: 0,
            server_type: 1,
            brackets: false,
        };
        Arc::new(WorldDirectory::from_config(
            &[world(1, false), world(2, true)],
            require_registration,
        ))
    }

    struct Fixture {
        store: Arc<MemoryAccountStore>,
        stats: Arc<GatewayStats>,
        protocol: LoginProtocol,
        client: ClientSession,
    }

    fn fixture(auto_create: bool) -> Fixture {
        fixture_with(policy(auto_create), worlds())
    }

    fn fixture_with(policy: LoginPolicy, worlds: Arc<WorldDirectory>) -> Fixture {
        let store = Arc::new(MemoryAccountStore::new());
        let stats = Arc::new(GatewayStats::new());
        let protocol = LoginProtocol::new(store.clone(), worlds, stats.clone(), policy);
        let session = Arc::new(Session::new(
            SessionKey::generate(),
            "198.51.100.7:40000".parse().unwrap(),
        ));
        Fixture {
            store,
            stats,
            protocol,
            client: ClientSession::new(session),
        }
    }

    async fn seed(store: &MemoryAccountStore, username: &str, password: &str, level: i16) {
        let hash = hash_password(password, FAST_BCRYPT).unwrap();
        store.insert(username, &hash, level).await.unwrap();
    }

    fn login(username: &str, password: &str) -> ClientPacket {
        ClientPacket::RequestAuthLogin {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    impl Fixture {
        async fn send(&mut self, packet: ClientPacket) -> Option<ServerPacket> {
            self.protocol.handle(&mut self.client, packet).await
        }

        async fn logged_in(auto_create: bool) -> Self {
            let mut fx = fixture(auto_create);
            seed(&fx.store, "bob", "secret", ACCESS_LEVEL_PLAYER).await;
            let response = fx.send(login("bob", "secret")).await;
            assert!(matches!(response, Some(ServerPacket::LoginOk { .. })));
            fx
        }

        fn prefix(&self) -> [u8; SESSION_PREFIX_LEN] {
            self.client.key().prefix()
        }
    }

    #[tokio::test]
    async fn test_auto_create_unknown_account() {
        let mut fx = fixture(true);

        let response = fx.send(login("bob", "secret")).await;

        assert_eq!(
            response,
            Some(ServerPacket::LoginOk {
                session_key: fx.client.key()
            })
        );
        let account = fx.store.get("bob").unwrap();
        assert_eq!(account.access_level, ACCESS_LEVEL_PLAYER);
        assert!(account.verify_password("secret"));
        assert_ne!(account.password_hash, "secret");
        assert_eq!(fx.stats.snapshot().successful_account_creations, 1);
        assert_eq!(fx.stats.snapshot().successful_logins, 0);
        assert_eq!(fx.client.state(), SessionState::Authenticated);
        assert_eq!(fx.client.handle().username().as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_unknown_account_without_auto_create() {
        let mut fx = fixture(false);

        let response = fx.send(login("bob", "secret")).await;

        assert_eq!(response, Some(login_fail(FailureReason::UserOrPassWrong)));
        assert_eq!(fx.stats.snapshot().failed_logins, 1);
        assert!(fx.store.is_empty());
        assert_eq!(fx.client.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let mut fx = fixture(true);
        seed(&fx.store, "bob", "secret", ACCESS_LEVEL_PLAYER).await;
        let before = fx.store.get("bob").unwrap();

        let response = fx.send(login("bob", "nope")).await;

        assert_eq!(response, Some(login_fail(FailureReason::UserOrPassWrong)));
        assert_eq!(fx.stats.snapshot().failed_logins, 1);
        assert_eq!(fx.store.get("bob").unwrap(), before);
        assert!(fx.client.account().is_none());
    }

    #[tokio::test]
    async fn test_access_level_below_threshold() {
        let mut fx = fixture(true);
        seed(&fx.store, "bob", "secret", ACCESS_LEVEL_BANNED).await;

        let response = fx.send(login("bob", "secret")).await;

        assert_eq!(response, Some(login_fail(FailureReason::AccessFailed)));
        assert_eq!(fx.stats.snapshot().failed_logins, 1);
        assert_eq!(fx.client.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_successful_login_is_case_insensitive() {
        let mut fx = fixture(false);
        seed(&fx.store, "bob", "secret", ACCESS_LEVEL_PLAYER).await;

        let response = fx.send(login("  BoB ", "secret")).await;

        assert!(matches!(response, Some(ServerPacket::LoginOk { .. })));
        assert_eq!(fx.stats.snapshot().successful_logins, 1);
        assert_eq!(fx.client.account().unwrap().username, "bob");
    }

    #[tokio::test]
    async fn test_malformed_username() {
        let mut fx = fixture(true);
        let response = fx.send(login("", "secret")).await;

        assert_eq!(response, Some(login_fail(FailureReason::UserOrPassWrong)));
        assert_eq!(fx.stats.snapshot().failed_logins, 1);
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn test_second_login_is_refused() {
        let mut fx = Fixture::logged_in(false).await;
        let response = fx.send(login("bob", "secret")).await;

        assert_eq!(response, Some(login_fail(FailureReason::AccessFailed)));
        assert_eq!(fx.stats.snapshot().hack_attempts, 1);
        assert_eq!(fx.client.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_play_with_matching_prefix() {
        let mut fx = Fixture::logged_in(false).await;
        let prefix = fx.prefix();

        let response = fx
            .send(ClientPacket::RequestPlay {
                session_prefix: prefix,
                server_id: 1,
            })
            .await;

        assert_eq!(
            response,
            Some(ServerPacket::PlayOk {
                play_key: fx.client.key().suffix(),
                server_id: 1,
            })
        );
        assert_eq!(fx.client.state(), SessionState::ServerSelected);
        assert_eq!(fx.stats.snapshot().hack_attempts, 0);
    }

    #[tokio::test]
    async fn test_play_with_mismatched_prefix() {
        let mut fx = Fixture::logged_in(false).await;
        let mut prefix = fx.prefix();
        prefix[0] ^= 0xff;

        let response = fx
            .send(ClientPacket::RequestPlay {
                session_prefix: prefix,
                server_id: 1,
            })
            .await;

        assert_eq!(response, Some(play_fail(FailureReason::AccessFailed)));
        assert_eq!(fx.stats.snapshot().hack_attempts, 1);
        assert_eq!(fx.client.state(), SessionState::Authenticated);

        // The session keeps working
        let prefix = fx.prefix();
        let response = fx
            .send(ClientPacket::RequestServerList {
                session_prefix: prefix,
            })
            .await;
        assert!(matches!(response, Some(ServerPacket::ServerList { .. })));
    }

    #[tokio::test]
    async fn test_play_for_unknown_server() {
        let mut fx = Fixture::logged_in(false).await;
        let prefix = fx.prefix();

        for server_id in [0u8, 3, 255] {
            let response = fx
                .send(ClientPacket::RequestPlay {
                    session_prefix: prefix,
                    server_id,
                })
                .await;
            assert_eq!(response, Some(play_fail(FailureReason::AccessFailed)));
        }
        assert_eq!(fx.stats.snapshot().hack_attempts, 3);
    }

    #[tokio::test]
    async fn test_testing_server_requires_elevated_access() {
        let mut fx = Fixture::logged_in(false).await;
        let prefix = fx.prefix();

        let response = fx
            .send(ClientPacket::RequestPlay {
                session_prefix: prefix,
                server_id: 2,
            })
            .await;
        assert_eq!(response, Some(play_fail(FailureReason::AccessFailed)));

        let mut gm = fixture(false);
        seed(&gm.store, "gm", "secret", ACCESS_LEVEL_GM).await;
        gm.send(login("gm", "secret")).await;
        let prefix = gm.prefix();
        let response = gm
            .send(ClientPacket::RequestPlay {
                session_prefix: prefix,
                server_id: 2,
            })
            .await;
        assert!(matches!(
            response,
            Some(ServerPacket::PlayOk { server_id: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_requests_before_login_are_refused() {
        let mut fx = fixture(true);
        let prefix = fx.prefix();

        let response = fx
            .send(ClientPacket::RequestServerList {
                session_prefix: prefix,
            })
            .await;
        assert_eq!(response, Some(login_fail(FailureReason::AccessFailed)));

        let response = fx
            .send(ClientPacket::RequestPlay {
                session_prefix: prefix,
                server_id: 1,
            })
            .await;
        assert_eq!(response, Some(play_fail(FailureReason::AccessFailed)));
        assert_eq!(fx.stats.snapshot().hack_attempts, 2);
    }

    #[tokio::test]
    async fn test_server_list() {
        let mut fx = Fixture::logged_in(false).await;
        let prefix = fx.prefix();

        let response = fx
            .send(ClientPacket::RequestServerList {
                session_prefix: prefix,
            })
            .await;

        let Some(ServerPacket::ServerList { servers }) = response else {
            panic!("expected server list, got {:?}", response);
        };
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].id, 1);
        assert_eq!(servers[0].address, Ipv4Addr::new(203, 0, 113, 1));
        assert_eq!(servers[1].id, 2);
    }

    #[tokio::test]
    async fn test_server_list_with_mismatched_prefix() {
        let mut fx = Fixture::logged_in(false).await;

        let response = fx
            .send(ClientPacket::RequestServerList {
                session_prefix: [0xaa; SESSION_PREFIX_LEN],
            })
            .await;

        assert_eq!(response, Some(login_fail(FailureReason::AccessFailed)));
        assert_eq!(fx.stats.snapshot().hack_attempts, 1);
    }

    #[tokio::test]
    async fn test_unknown_opcode_is_ignored() {
        let mut fx = fixture(true);
        let response = fx
            .send(ClientPacket::Unknown {
                opcode: 0x42,
                payload: vec![1, 2, 3],
            })
            .await;

        assert_eq!(response, None);
        assert_eq!(fx.stats.snapshot(), StatsSnapshot::default());
        assert_eq!(fx.client.state(), SessionState::Connected);
    }

    struct BrokenStore {
        fail_insert_only: bool,
    }

    #[async_trait]
    impl AccountStore for BrokenStore {
        async fn find_by_username(
            &self,
            _username: &str,
        ) -> Result<Option<Account>, StoreError> {
            if self.fail_insert_only {
                Ok(None)
            } else {
                Err(StoreError::Unavailable("connection refused".to_string()))
            }
        }

        async fn insert(
            &self,
            username: &str,
            _hash: &str,
            _level: i16,
        ) -> Result<i64, StoreError> {
            Err(StoreError::DuplicateUsername(username.to_string()))
        }
    }

    fn broken_fixture(
        fail_insert_only: bool,
    ) -> (LoginProtocol, Arc<GatewayStats>, ClientSession) {
        let stats = Arc::new(GatewayStats::new());
        let protocol = LoginProtocol::new(
            Arc::new(BrokenStore { fail_insert_only }),
            worlds(),
            stats.clone(),
            policy(true),
        );
        let session = Arc::new(Session::new(
            SessionKey::generate(),
            "127.0.0.1:5000".parse().unwrap(),
        ));
        (protocol, stats, ClientSession::new(session))
    }

    #[tokio::test]
    async fn test_lookup_failure_is_system_error() {
        let (protocol, stats, mut client) = broken_fixture(false);

        let response = protocol.handle(&mut client, login("bob", "secret")).await;

        assert_eq!(response, Some(login_fail(FailureReason::SystemError)));
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[tokio::test]
    async fn test_insert_failure_counts_failed_creation() {
        let (protocol, stats, mut client) = broken_fixture(true);

        let response = protocol.handle(&mut client, login("bob", "secret")).await;

        assert_eq!(response, Some(login_fail(FailureReason::SystemError)));
        assert_eq!(stats.snapshot().failed_account_creations, 1);
        assert_eq!(stats.snapshot().failed_logins, 0);
        assert!(client.account().is_none());
    }

    #[tokio::test]
    async fn test_hash_failure_counts_failed_creation() {
        let mut bad_policy = policy(true);
        bad_policy.password_scheme = PasswordScheme::Bcrypt { cost: 2 };
        let mut fx = fixture_with(bad_policy, worlds());

        let response = fx.send(login("bob", "secret")).await;

        assert_eq!(response, Some(login_fail(FailureReason::SystemError)));
        assert_eq!(fx.stats.snapshot().failed_account_creations, 1);
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn test_hashing_leaves_runtime_responsive() {
        let mut slow_policy = policy(true);
        slow_policy.password_scheme = PasswordScheme::Bcrypt { cost: 10 };
        let mut fx = fixture_with(slow_policy, worlds());

        // tokio::test runs a current-thread runtime, so a blocking hash would
        // hold this timer back until the login finished
        let started = Instant::now();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            started.elapsed()
        });

        let response = fx.send(login("bob", "secret")).await;
        let login_took = started.elapsed();
        let timer_woke = timer.await.unwrap();

        assert!(matches!(response, Some(ServerPacket::LoginOk { .. })));
        assert!(
            timer_woke < login_took,
            "timer woke at {:?}, login took {:?}",
            timer_woke,
            login_took
        );
    }

    #[tokio::test]
    async fn test_unknown_account_costs_a_verification() {
        let mut slow_policy = policy(false);
        slow_policy.password_scheme = PasswordScheme::Bcrypt { cost: 10 };
        let mut fx = fixture_with(slow_policy, worlds());

        let started = Instant::now();
        let response = fx.send(login("nobody", "secret")).await;

        assert_eq!(response, Some(login_fail(FailureReason::UserOrPassWrong)));
        assert!(started.elapsed() >= Duration::from_millis(5));
        assert_eq!(fx.stats.snapshot().failed_logins, 1);
    }

    #[tokio::test]
    async fn test_play_for_offline_server() {
        let mut fx = fixture_with(policy(false), worlds_with(true));
        seed(&fx.store, "bob", "secret", ACCESS_LEVEL_PLAYER).await;
        fx.send(login("bob", "secret")).await;
        let prefix = fx.prefix();

        let response = fx
            .send(ClientPacket::RequestPlay {
                session_prefix: prefix,
                server_id: 1,
            })
            .await;

        assert_eq!(response, Some(play_fail(FailureReason::ServerMaintenance)));
        assert_eq!(fx.stats.snapshot().hack_attempts, 0);
        assert_eq!(fx.client.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_play_for_full_server() {
        let worlds = worlds();
        worlds.set_population(1, 1000);
        let mut fx = fixture_with(policy(false), worlds.clone());
        seed(&fx.store, "bob", "secret", ACCESS_LEVEL_PLAYER).await;
        fx.send(login("bob", "secret")).await;
        let prefix = fx.prefix();

        let response = fx
            .send(ClientPacket::RequestPlay {
                session_prefix: prefix,
                server_id: 1,
            })
            .await;
        assert_eq!(response, Some(play_fail(FailureReason::ServerOverloaded)));
        assert_eq!(fx.stats.snapshot().hack_attempts, 0);

        // Elevated accounts get in regardless
        let mut gm = fixture_with(policy(false), worlds);
        seed(&gm.store, "gm", "secret", ACCESS_LEVEL_GM).await;
        gm.send(login("gm", "secret")).await;
        let prefix = gm.prefix();
        let response = gm
            .send(ClientPacket::RequestPlay {
                session_prefix: prefix,
                server_id: 1,
            })
            .await;
        assert!(matches!(
            response,
            Some(ServerPacket::PlayOk { server_id: 1, .. })
        ));
    }
}
