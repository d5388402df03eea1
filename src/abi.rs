//! Solidity ABI of the `XVerification` contract and the Web2Json structs it consumes.

use alloy_sol_types::sol;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct ResponseBody {
        bytes abiEncodedData;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Response {
        bytes32 attestationType;
        bytes32 sourceId;
        bytes32 messageIntegrityCode;
        ResponseBody responseBody;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Proof {
        Response data;
        bytes32[] merkleProof;
    }

    /// Payload produced by the tweet jq filter.
    #[derive(Debug, PartialEq, Eq)]
    struct TweetAttestation {
        string tweetId;
        string authorId;
        string text;
    }

    #[sol(rpc)]
    interface IXVerification {
        event VerificationRequested(address indexed user, string tweetId, bytes32 requestId);
        event UserVerified(address indexed user, string twitterId, string tweetId);

        function WEB2JSON_ATTESTATION_TYPE() external view returns (bytes32);
        function fdcHub() external view returns (address);
        function fdcVerification() external view returns (address);
        function getUserTwitterId(address user) external view returns (string memory);
        function isUserVerified(address user) external view returns (bool);
        function requestIdToTweetId(bytes32 requestId) external view returns (string memory);
        function requestIdToUser(bytes32 requestId) external view returns (address);
        function userTwitterIds(address user) external view returns (string memory);
        function verifiedUsers(address user) external view returns (bool);
        function restrictedFunction() external view returns (string memory);

        function requestVerification(string tweetId, string expectedTwitterId) external payable;
        function submitVerification(bytes32 requestId, Proof proof) external;
        function revokeVerification() external;
    }
}
