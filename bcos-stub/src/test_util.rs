//! An in-memory BCOS node for tests.
//!
//! [MockChain] executes calls and signed transactions against the CNS precompile, seals one block per transaction
//! and returns receipts with real authentication paths, so the whole pipeline can run without a node. Knobs inject
//! the faults a real node can produce.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use alloy::primitives::{keccak256, Address, Bytes, B256};
use async_trait::async_trait;
use ethabi::{Function, Token};
use parking_lot::Mutex;
use receipt_proof::MerkleTree;
use tracing::debug;

use crate::{
    block_header::{BlockHeader, BlockHeaderManager},
    cns::CnsInfo,
    compiler::{CompiledContract, Compiler},
    connection::{
        Connection, Properties, Request, RequestKind, Response, BCOS_CHAIN_ID, BCOS_GROUP_ID,
        NODE_ERROR,
    },
    contracts::cns,
    error::{Result, StubError},
    transaction::{
        CallOutput, MerkleProofUnit, SignedTransaction, TransactionParams, TransactionReceipt,
    },
};

/// Receipts sealed into each block before and after the submitted transaction's, so authentication paths span more
/// than one level.
const FILLER_BEFORE: u64 = 5;
const FILLER_AFTER: u64 = 12;

pub const GROUP_ID: u64 = 1;
pub const CHAIN_ID: u64 = 1;

struct Block {
    header: BlockHeader,
}

#[derive(Default)]
struct ChainState {
    blocks: Vec<Block>,
    cns: Vec<CnsInfo>,
    code: HashMap<Address, Bytes>,
}

impl ChainState {
    fn height(&self) -> u64 {
        self.blocks.len() as u64 - 1
    }
}

pub struct MockChain {
    properties: Properties,
    state: Mutex<ChainState>,
    calls: AtomicUsize,
    sends: AtomicUsize,
    call_latency: Mutex<Duration>,
    corrupt_proofs: AtomicBool,
    rejection: Mutex<Option<String>>,
    registration_rejection: Mutex<Option<String>>,
    call_failure: Mutex<Option<String>>,
    headers_unavailable: AtomicBool,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    /// A chain holding only its genesis block, in group [GROUP_ID] of chain [CHAIN_ID].
    pub fn new() -> MockChain {
        let genesis = BlockHeader {
            receipts_root: MerkleTree::new(vec![]).root(),
            ..Default::default()
        };
        let properties = Properties::new(HashMap::from([
            (BCOS_GROUP_ID.to_owned(), GROUP_ID.to_string()),
            (BCOS_CHAIN_ID.to_owned(), CHAIN_ID.to_string()),
        ]));

        MockChain {
            properties,
            state: Mutex::new(ChainState {
                blocks: vec![Block { header: genesis }],
                ..Default::default()
            }),
            calls: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            call_latency: Mutex::new(Duration::ZERO),
            corrupt_proofs: AtomicBool::new(false),
            rejection: Mutex::new(None),
            registration_rejection: Mutex::new(None),
            call_failure: Mutex::new(None),
            headers_unavailable: AtomicBool::new(false),
        }
    }

    /// Number of call requests received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of transactions received, including rejected ones.
    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn height(&self) -> u64 {
        self.state.lock().height()
    }

    pub fn cns_entries(&self) -> Vec<CnsInfo> {
        self.state.lock().cns.clone()
    }

    pub fn code_at(&self, address: Address) -> Option<Bytes> {
        self.state.lock().code.get(&address).cloned()
    }

    /// Registers an entry directly, without a transaction.
    pub fn insert_cns(&self, info: CnsInfo) {
        self.state.lock().cns.push(info);
    }

    /// Delays every call by `latency` before it is answered.
    pub fn set_call_latency(&self, latency: Duration) {
        *self.call_latency.lock() = latency;
    }

    /// Makes every subsequent receipt carry an authentication path which does not lead to its block's root.
    pub fn set_corrupt_proofs(&self, corrupt: bool) {
        self.corrupt_proofs.store(corrupt, Ordering::SeqCst);
    }

    /// Makes the node refuse every subsequent transaction with `message`.
    pub fn set_rejection(&self, message: Option<&str>) {
        *self.rejection.lock() = message.map(str::to_owned);
    }

    /// Makes the node refuse every subsequent CNS registration with `message`. Other transactions are still sealed.
    pub fn set_registration_rejection(&self, message: Option<&str>) {
        *self.registration_rejection.lock() = message.map(str::to_owned);
    }

    /// Makes the node fail every subsequent call with `message`, after the call latency has passed.
    pub fn set_call_failure(&self, message: Option<&str>) {
        *self.call_failure.lock() = message.map(str::to_owned);
    }

    /// Makes the node answer every header request as if the block did not exist.
    pub fn set_headers_unavailable(&self, unavailable: bool) {
        self.headers_unavailable.store(unavailable, Ordering::SeqCst);
    }

    async fn call(&self, params: TransactionParams) -> Response {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.call_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(message) = self.call_failure.lock().clone() {
            return Response::error(NODE_ERROR, message);
        }

        let input = match decode_hex(&params.data) {
            Ok(input) => input,
            Err(e) => return Response::error(NODE_ERROR, e),
        };

        let state = self.state.lock();
        let output = if params.to == Some(cns::ADDRESS) {
            let Some((function, tokens)) = decode_cns_input(&input) else {
                return Response::error(NODE_ERROR, "unknown CNS method");
            };
            let name = string_arg(&tokens, 0);
            let version = (function.name == cns::METHOD_SELECT_BY_NAME_AND_VERSION)
                .then(|| string_arg(&tokens, 1));
            let matches: Vec<_> = state
                .cns
                .iter()
                .filter(|info| {
                    info.name == name && version.as_ref().is_none_or(|v| info.version == *v)
                })
                .cloned()
                .collect();
            let json = serde_json::to_string(&matches).unwrap_or_default();
            Bytes::from(ethabi::encode(&[Token::String(json)]))
        } else {
            Bytes::new()
        };

        json_response(&CallOutput {
            current_block_number: state.height(),
            output,
            status: 0,
        })
    }

    fn send_transaction(&self, params: TransactionParams) -> Response {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.rejection.lock().clone() {
            return Response::error(NODE_ERROR, message);
        }

        let signed = match SignedTransaction::from_hex(&params.data) {
            Ok(signed) => signed,
            Err(e) => return Response::error(NODE_ERROR, e.to_string()),
        };
        let sender = match signed.recover_signer() {
            Ok(sender) => sender,
            Err(e) => return Response::error(NODE_ERROR, e.to_string()),
        };
        let tx = &signed.tx;
        if tx.group_id != GROUP_ID || tx.chain_id != CHAIN_ID {
            return Response::error(NODE_ERROR, "invalid group id or chain id");
        }

        let mut state = self.state.lock();
        let number = state.height() + 1;
        if tx.block_limit < number {
            return Response::error(NODE_ERROR, "block limit exceeded");
        }

        let mut receipt = TransactionReceipt {
            transaction_hash: signed.hash(),
            transaction_index: FILLER_BEFORE,
            block_number: number,
            gas_used: 21_000,
            from: Some(sender),
            to: tx.to,
            ..Default::default()
        };
        match tx.to {
            None => {
                let mut seed = sender.to_vec();
                seed.extend_from_slice(&tx.random_id.to_be_bytes());
                let address = Address::from_slice(&keccak256(seed)[12..]);
                state.code.insert(address, tx.data.clone());
                receipt.contract_address = Some(address);
            }
            Some(to) if to == cns::ADDRESS => {
                let Some((function, tokens)) = decode_cns_input(&tx.data) else {
                    return Response::error(NODE_ERROR, "unknown CNS method");
                };
                if function.name != cns::METHOD_INSERT {
                    return Response::error(NODE_ERROR, "CNS select sent as a transaction");
                }
                if let Some(message) = self.registration_rejection.lock().clone() {
                    return Response::error(NODE_ERROR, message);
                }
                let info = CnsInfo {
                    name: string_arg(&tokens, 0),
                    version: string_arg(&tokens, 1),
                    address: string_arg(&tokens, 2),
                    abi: string_arg(&tokens, 3),
                };
                let exists = state
                    .cns
                    .iter()
                    .any(|i| i.name == info.name && i.version == info.version);
                if !exists {
                    state.cns.push(info);
                }
                receipt.output =
                    Bytes::from(ethabi::encode(&[Token::Uint((!exists as u64).into())]));
            }
            Some(_) => {}
        }

        let receipts: Vec<TransactionReceipt> = (0..FILLER_BEFORE)
            .map(|i| filler(number, i))
            .chain(std::iter::once(receipt.clone()))
            .chain((FILLER_BEFORE + 1..FILLER_BEFORE + 1 + FILLER_AFTER).map(|i| filler(number, i)))
            .collect();
        let tree = MerkleTree::new(receipts.iter().map(TransactionReceipt::leaf_hash).collect());
        receipt.receipt_proof = tree
            .proof(FILLER_BEFORE as usize)
            .unwrap_or_default()
            .iter()
            .map(MerkleProofUnit::from)
            .collect();
        if self.corrupt_proofs.load(Ordering::SeqCst) {
            if let Some(entry) = receipt
                .receipt_proof
                .iter_mut()
                .flat_map(|unit| unit.left.iter_mut().chain(unit.right.iter_mut()))
                .next()
            {
                *entry = keccak256(entry.as_bytes()).to_string();
            }
        }

        let parent = &state.blocks[state.blocks.len() - 1].header;
        let mut header = BlockHeader {
            number,
            hash: B256::ZERO,
            parent_hash: parent.hash,
            state_root: keccak256(number.to_be_bytes()),
            transactions_root: keccak256(receipt.transaction_hash),
            receipts_root: tree.root(),
            timestamp: number * 1000,
        };
        header.hash = keccak256(header.encode());
        state.blocks.push(Block { header });
        debug!(number, hash = %receipt.transaction_hash, "block sealed");

        json_response(&receipt)
    }
}

#[async_trait]
impl Connection for MockChain {
    async fn send(&self, request: Request) -> Response {
        let params: TransactionParams = match serde_json::from_slice(&request.payload) {
            Ok(params) => params,
            Err(e) => return Response::error(NODE_ERROR, e.to_string()),
        };
        match request.kind {
            RequestKind::Call => self.call(params).await,
            RequestKind::SendTransaction => self.send_transaction(params),
        }
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }
}

#[async_trait]
impl BlockHeaderManager for MockChain {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.height())
    }

    async fn block_header(&self, number: u64) -> Result<Option<Vec<u8>>> {
        if self.headers_unavailable.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let state = self.state.lock();
        Ok(usize::try_from(number)
            .ok()
            .and_then(|n| state.blocks.get(n))
            .map(|block| block.header.encode()))
    }
}

fn filler(block_number: u64, index: u64) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: keccak256([block_number.to_be_bytes(), index.to_be_bytes()].concat()),
        transaction_index: index,
        block_number,
        gas_used: 21_000,
        ..Default::default()
    }
}

fn decode_hex(data: &str) -> std::result::Result<Vec<u8>, String> {
    hex::decode(data.strip_prefix("0x").unwrap_or(data)).map_err(|e| e.to_string())
}

fn decode_cns_input(input: &[u8]) -> Option<(&'static Function, Vec<Token>)> {
    if input.len() < 4 {
        return None;
    }
    let function: &'static Function = [
        &*cns::INSERT,
        &*cns::SELECT_BY_NAME,
        &*cns::SELECT_BY_NAME_AND_VERSION,
    ]
    .into_iter()
    .find(|f| f.short_signature() == input[..4])?;
    let tokens = function.decode_input(&input[4..]).ok()?;
    Some((function, tokens))
}

fn string_arg(tokens: &[Token], index: usize) -> String {
    tokens
        .get(index)
        .cloned()
        .and_then(Token::into_string)
        .unwrap_or_default()
}

fn json_response<T: serde::Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(data) => Response::success(data),
        Err(e) => Response::error(NODE_ERROR, e.to_string()),
    }
}

/// Returns a fixed compilation result for each known contract name and counts compilations.
#[derive(Default)]
pub struct FixedCompiler {
    contracts: HashMap<String, CompiledContract>,
    compilations: AtomicUsize,
}

/// A contract with a constructor that takes no arguments.
pub const HELLO_ABI: &str = r#"[{"inputs":[],"stateMutability":"nonpayable","type":"constructor"},{"inputs":[],"name":"get","outputs":[{"internalType":"string","name":"","type":"string"}],"stateMutability":"view","type":"function"}]"#;
/// A contract whose constructor requires a `string` and a `uint256`.
pub const GREETER_ABI: &str = r#"[{"inputs":[{"internalType":"string","name":"greeting","type":"string"},{"internalType":"uint256","name":"count","type":"uint256"}],"stateMutability":"nonpayable","type":"constructor"}]"#;

impl FixedCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contract(mut self, name: &str, abi: &str, bytecode: &[u8]) -> Self {
        self.contracts.insert(
            name.to_owned(),
            CompiledContract {
                abi: abi.to_owned(),
                bytecode: Bytes::copy_from_slice(bytecode),
            },
        );
        self
    }

    /// Knows `Hello`, `Greeter` and `WeCrossProxy`.
    pub fn standard() -> Self {
        Self::new()
            .with_contract("Hello", HELLO_ABI, &[0x60, 0x80, 0x60, 0x40, 0x01])
            .with_contract("Greeter", GREETER_ABI, &[0x60, 0x80, 0x60, 0x40, 0x02])
            .with_contract("WeCrossProxy", HELLO_ABI, &[0x60, 0x80, 0x60, 0x40, 0x03])
    }

    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Compiler for FixedCompiler {
    async fn compile(&self, _source: &str, contract_name: &str) -> Result<CompiledContract> {
        self.compilations.fetch_add(1, Ordering::SeqCst);
        self.contracts
            .get(contract_name)
            .cloned()
            .ok_or_else(|| {
                StubError::Compile(format!("Error: {contract_name} not found in source"))
            })
    }
}
